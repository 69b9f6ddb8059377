//! Per-domain response schemas.
//!
//! A schema names every field the model is asked for: the JSON key, the
//! section headings accepted in prose, the value kind, and whether the
//! field is required. The prompt builder and the extractor both read the
//! same schema, so the instructions and the parser cannot drift apart.
//! `FromExtraction` turns extracted fields into the typed result objects.

use crate::models::enums::GuidanceDomain;
use crate::models::guidance::{
    AdviceResult, EmergencyGuidance, HealthPlan, Macronutrients, MentalHealthSupport,
    NutritionAnalysis, RiskAssessment, SymptomAnalysis,
};
use crate::pipeline::safety::fallback::STANDARD_DISCLAIMER;

use super::parser::Extraction;
use super::GuidanceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Free text, kept verbatim after trimming.
    Text,
    /// Bullet or array items.
    List,
    /// One of LOW, MEDIUM, HIGH, CRITICAL.
    Severity,
    /// Leading number in the value, e.g. "650 kcal".
    Number,
}

#[derive(Debug)]
pub struct FieldSpec {
    pub key: &'static str,
    pub headings: &'static [&'static str],
    pub kind: FieldKind,
    pub required: bool,
}

#[derive(Debug)]
pub struct DomainSchema {
    pub domain: GuidanceDomain,
    pub fields: &'static [FieldSpec],
}

impl DomainSchema {
    pub fn required_keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().filter(|f| f.required).map(|f| f.key)
    }
}

const fn required(
    key: &'static str,
    headings: &'static [&'static str],
    kind: FieldKind,
) -> FieldSpec {
    FieldSpec {
        key,
        headings,
        kind,
        required: true,
    }
}

const fn optional(
    key: &'static str,
    headings: &'static [&'static str],
    kind: FieldKind,
) -> FieldSpec {
    FieldSpec {
        key,
        headings,
        kind,
        required: false,
    }
}

pub mod keys {
    pub const POSSIBLE_CONDITIONS: &str = "possibleConditions";
    pub const SEVERITY_LEVEL: &str = "severityLevel";
    pub const RECOMMENDATIONS: &str = "recommendations";
    pub const URGENCY: &str = "urgency";

    pub const RISK: &str = "risk";
    pub const PROBABILITY: &str = "probability";

    pub const SEVERITY: &str = "severity";
    pub const ASSESSMENT: &str = "assessment";
    pub const IMMEDIATE_ACTIONS: &str = "immediateActions";
    pub const DO_NOT_DO: &str = "doNotDo";

    pub const GOALS: &str = "goals";
    pub const DIET_PLAN: &str = "dietPlan";
    pub const EXERCISE_ROUTINE: &str = "exerciseRoutine";
    pub const LIFESTYLE_RECOMMENDATIONS: &str = "lifestyleRecommendations";
    pub const PROGRESS_TRACKING: &str = "progressTracking";

    pub const ADVICE: &str = "advice";
    pub const DISCLAIMER: &str = "disclaimer";

    pub const SUPPORT: &str = "support";
    pub const SUGGESTIONS: &str = "suggestions";
    pub const RESOURCES: &str = "resources";

    pub const CALORIES: &str = "calories";
    pub const PROTEIN: &str = "protein";
    pub const CARBOHYDRATES: &str = "carbohydrates";
    pub const FAT: &str = "fat";
}

use FieldKind::{List, Number, Text};

static SYMPTOM_SCHEMA: DomainSchema = DomainSchema {
    domain: GuidanceDomain::Symptom,
    fields: &[
        required(
            keys::POSSIBLE_CONDITIONS,
            &["Possible Conditions", "Conditions"],
            List,
        ),
        required(
            keys::SEVERITY_LEVEL,
            &["Severity Level", "Severity"],
            FieldKind::Severity,
        ),
        required(keys::RECOMMENDATIONS, &["Recommendations"], List),
        required(keys::URGENCY, &["Urgency"], Text),
    ],
};

static RISK_SCHEMA: DomainSchema = DomainSchema {
    domain: GuidanceDomain::Risk,
    fields: &[
        required(keys::RISK, &["Risk Level", "Risk"], Text),
        required(keys::PROBABILITY, &["Probability", "Likelihood"], Text),
        required(keys::RECOMMENDATIONS, &["Recommendations"], List),
    ],
};

static EMERGENCY_SCHEMA: DomainSchema = DomainSchema {
    domain: GuidanceDomain::Emergency,
    fields: &[
        required(
            keys::SEVERITY,
            &["Severity Level", "Severity"],
            FieldKind::Severity,
        ),
        required(keys::ASSESSMENT, &["Assessment"], Text),
        required(
            keys::IMMEDIATE_ACTIONS,
            &["Immediate Actions", "What To Do"],
            List,
        ),
        required(
            keys::DO_NOT_DO,
            &["Do Not Do", "What Not To Do", "Do Not"],
            List,
        ),
    ],
};

static PLAN_SCHEMA: DomainSchema = DomainSchema {
    domain: GuidanceDomain::Plan,
    fields: &[
        required(keys::GOALS, &["Goals"], List),
        required(keys::DIET_PLAN, &["Diet Plan", "Diet"], List),
        required(
            keys::EXERCISE_ROUTINE,
            &["Exercise Routine", "Exercise Plan", "Exercise"],
            List,
        ),
        required(
            keys::LIFESTYLE_RECOMMENDATIONS,
            &["Lifestyle Recommendations", "Lifestyle"],
            List,
        ),
        required(
            keys::PROGRESS_TRACKING,
            &["Progress Tracking", "Tracking Progress"],
            List,
        ),
    ],
};

static ADVICE_SCHEMA: DomainSchema = DomainSchema {
    domain: GuidanceDomain::Advice,
    fields: &[
        required(keys::ADVICE, &["Advice"], Text),
        optional(keys::RECOMMENDATIONS, &["Recommendations"], List),
        optional(keys::DISCLAIMER, &["Disclaimer"], Text),
    ],
};

static MENTAL_HEALTH_SCHEMA: DomainSchema = DomainSchema {
    domain: GuidanceDomain::MentalHealth,
    fields: &[
        required(keys::SUPPORT, &["Support"], Text),
        required(keys::RECOMMENDATIONS, &["Recommendations"], List),
        required(
            keys::SUGGESTIONS,
            &["Suggestions", "Coping Strategies"],
            List,
        ),
        required(keys::RESOURCES, &["Resources"], List),
    ],
};

static NUTRITION_SCHEMA: DomainSchema = DomainSchema {
    domain: GuidanceDomain::Nutrition,
    fields: &[
        required(keys::CALORIES, &["Total Calories", "Calories"], Number),
        required(keys::PROTEIN, &["Protein"], Number),
        required(keys::CARBOHYDRATES, &["Carbohydrates", "Carbs"], Number),
        required(keys::FAT, &["Fat"], Number),
        required(keys::RECOMMENDATIONS, &["Recommendations"], List),
        optional(keys::DISCLAIMER, &["Disclaimer"], Text),
    ],
};

pub fn schema_for(domain: GuidanceDomain) -> &'static DomainSchema {
    match domain {
        GuidanceDomain::Symptom => &SYMPTOM_SCHEMA,
        GuidanceDomain::Risk => &RISK_SCHEMA,
        GuidanceDomain::Emergency => &EMERGENCY_SCHEMA,
        GuidanceDomain::Plan => &PLAN_SCHEMA,
        GuidanceDomain::Advice => &ADVICE_SCHEMA,
        GuidanceDomain::MentalHealth => &MENTAL_HEALTH_SCHEMA,
        GuidanceDomain::Nutrition => &NUTRITION_SCHEMA,
    }
}

impl GuidanceDomain {
    pub fn schema(self) -> &'static DomainSchema {
        schema_for(self)
    }
}

/// Typed construction from extracted fields.
pub trait FromExtraction: Sized {
    const DOMAIN: GuidanceDomain;

    fn from_extraction(extraction: &Extraction) -> Result<Self, GuidanceError>;
}

impl FromExtraction for SymptomAnalysis {
    const DOMAIN: GuidanceDomain = GuidanceDomain::Symptom;

    fn from_extraction(e: &Extraction) -> Result<Self, GuidanceError> {
        Ok(Self {
            possible_conditions: e.require_list(keys::POSSIBLE_CONDITIONS)?,
            severity_level: e.require_severity(keys::SEVERITY_LEVEL)?,
            recommendations: e.require_list(keys::RECOMMENDATIONS)?,
            urgency: e.require_text(keys::URGENCY)?,
        })
    }
}

impl FromExtraction for RiskAssessment {
    const DOMAIN: GuidanceDomain = GuidanceDomain::Risk;

    fn from_extraction(e: &Extraction) -> Result<Self, GuidanceError> {
        Ok(Self {
            risk: e.require_text(keys::RISK)?,
            probability: e.require_text(keys::PROBABILITY)?,
            recommendations: e.require_list(keys::RECOMMENDATIONS)?,
        })
    }
}

impl FromExtraction for EmergencyGuidance {
    const DOMAIN: GuidanceDomain = GuidanceDomain::Emergency;

    fn from_extraction(e: &Extraction) -> Result<Self, GuidanceError> {
        Ok(Self {
            severity: e.require_severity(keys::SEVERITY)?,
            assessment: e.require_text(keys::ASSESSMENT)?,
            immediate_actions: e.require_list(keys::IMMEDIATE_ACTIONS)?,
            do_not_do: e.require_list(keys::DO_NOT_DO)?,
        })
    }
}

impl FromExtraction for HealthPlan {
    const DOMAIN: GuidanceDomain = GuidanceDomain::Plan;

    fn from_extraction(e: &Extraction) -> Result<Self, GuidanceError> {
        Ok(Self {
            goals: e.require_list(keys::GOALS)?,
            diet_plan: e.require_list(keys::DIET_PLAN)?,
            exercise_routine: e.require_list(keys::EXERCISE_ROUTINE)?,
            lifestyle_recommendations: e.require_list(keys::LIFESTYLE_RECOMMENDATIONS)?,
            progress_tracking: e.require_list(keys::PROGRESS_TRACKING)?,
        })
    }
}

impl FromExtraction for AdviceResult {
    const DOMAIN: GuidanceDomain = GuidanceDomain::Advice;

    fn from_extraction(e: &Extraction) -> Result<Self, GuidanceError> {
        Ok(Self {
            advice: e.require_text(keys::ADVICE)?,
            recommendations: e
                .list(keys::RECOMMENDATIONS)
                .map(<[String]>::to_vec)
                .unwrap_or_default(),
            disclaimer: e
                .text(keys::DISCLAIMER)
                .unwrap_or(STANDARD_DISCLAIMER)
                .to_string(),
        })
    }
}

impl FromExtraction for MentalHealthSupport {
    const DOMAIN: GuidanceDomain = GuidanceDomain::MentalHealth;

    fn from_extraction(e: &Extraction) -> Result<Self, GuidanceError> {
        Ok(Self {
            support: e.require_text(keys::SUPPORT)?,
            recommendations: e.require_list(keys::RECOMMENDATIONS)?,
            suggestions: e.require_list(keys::SUGGESTIONS)?,
            resources: e.require_list(keys::RESOURCES)?,
        })
    }
}

impl FromExtraction for NutritionAnalysis {
    const DOMAIN: GuidanceDomain = GuidanceDomain::Nutrition;

    fn from_extraction(e: &Extraction) -> Result<Self, GuidanceError> {
        let calories = grams_or_kcal(e.require_number(keys::CALORIES)?);
        if calories == 0 {
            return Err(GuidanceError::Validation {
                domain: Self::DOMAIN,
                reason: "calorie estimate must be positive".to_string(),
            });
        }
        Ok(Self {
            calories,
            macros: Macronutrients {
                protein_g: grams_or_kcal(e.require_number(keys::PROTEIN)?),
                carbohydrates_g: grams_or_kcal(e.require_number(keys::CARBOHYDRATES)?),
                fat_g: grams_or_kcal(e.require_number(keys::FAT)?),
            },
            recommendations: e.require_list(keys::RECOMMENDATIONS)?,
            disclaimer: e
                .text(keys::DISCLAIMER)
                .unwrap_or(STANDARD_DISCLAIMER)
                .to_string(),
        })
    }
}

/// Round to a whole non-negative quantity.
fn grams_or_kcal(value: f64) -> u32 {
    if value.is_finite() && value > 0.0 {
        value.round().min(u32::MAX as f64) as u32
    } else {
        0
    }
}
