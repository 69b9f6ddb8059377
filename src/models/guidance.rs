use serde::{Deserialize, Serialize};

use super::enums::Severity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymptomAnalysis {
    pub possible_conditions: Vec<String>,
    pub severity_level: Severity,
    pub recommendations: Vec<String>,
    pub urgency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk: String,
    pub probability: String,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyGuidance {
    pub severity: Severity,
    pub assessment: String,
    pub immediate_actions: Vec<String>,
    pub do_not_do: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthPlan {
    pub goals: Vec<String>,
    pub diet_plan: Vec<String>,
    pub exercise_routine: Vec<String>,
    pub lifestyle_recommendations: Vec<String>,
    pub progress_tracking: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdviceResult {
    pub advice: String,
    /// May be empty.
    pub recommendations: Vec<String>,
    pub disclaimer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentalHealthSupport {
    pub support: String,
    pub recommendations: Vec<String>,
    pub suggestions: Vec<String>,
    pub resources: Vec<String>,
}

/// Estimated macronutrients in grams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Macronutrients {
    pub protein_g: u32,
    pub carbohydrates_g: u32,
    pub fat_g: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionAnalysis {
    pub calories: u32,
    pub macros: Macronutrients,
    pub recommendations: Vec<String>,
    pub disclaimer: String,
}

/// One variant per facade operation, mirroring `Query`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Guidance {
    Symptom(SymptomAnalysis),
    Risk(RiskAssessment),
    Emergency(EmergencyGuidance),
    Plan(HealthPlan),
    Advice(AdviceResult),
    MentalHealth(MentalHealthSupport),
    Nutrition(NutritionAnalysis),
}

/// Structural completeness: every required field present and non-blank.
///
/// Results that fail this check never leave the facade; the fallback
/// path is used instead.
pub trait Complete {
    fn is_complete(&self) -> bool;
}

fn filled(text: &str) -> bool {
    !text.trim().is_empty()
}

fn filled_list(items: &[String]) -> bool {
    !items.is_empty() && items.iter().all(|i| filled(i))
}

fn no_blank_entries(items: &[String]) -> bool {
    items.iter().all(|i| filled(i))
}

impl Complete for SymptomAnalysis {
    fn is_complete(&self) -> bool {
        filled_list(&self.possible_conditions)
            && filled_list(&self.recommendations)
            && filled(&self.urgency)
    }
}

impl Complete for RiskAssessment {
    fn is_complete(&self) -> bool {
        filled(&self.risk) && filled(&self.probability) && filled_list(&self.recommendations)
    }
}

impl Complete for EmergencyGuidance {
    fn is_complete(&self) -> bool {
        filled(&self.assessment)
            && filled_list(&self.immediate_actions)
            && filled_list(&self.do_not_do)
    }
}

impl Complete for HealthPlan {
    fn is_complete(&self) -> bool {
        filled_list(&self.goals)
            && filled_list(&self.diet_plan)
            && filled_list(&self.exercise_routine)
            && filled_list(&self.lifestyle_recommendations)
            && filled_list(&self.progress_tracking)
    }
}

impl Complete for AdviceResult {
    fn is_complete(&self) -> bool {
        filled(&self.advice) && no_blank_entries(&self.recommendations) && filled(&self.disclaimer)
    }
}

impl Complete for MentalHealthSupport {
    fn is_complete(&self) -> bool {
        filled(&self.support)
            && filled_list(&self.recommendations)
            && filled_list(&self.suggestions)
            && filled_list(&self.resources)
    }
}

impl Complete for NutritionAnalysis {
    fn is_complete(&self) -> bool {
        self.calories > 0 && filled_list(&self.recommendations) && filled(&self.disclaimer)
    }
}

impl Complete for Guidance {
    fn is_complete(&self) -> bool {
        match self {
            Guidance::Symptom(g) => g.is_complete(),
            Guidance::Risk(g) => g.is_complete(),
            Guidance::Emergency(g) => g.is_complete(),
            Guidance::Plan(g) => g.is_complete(),
            Guidance::Advice(g) => g.is_complete(),
            Guidance::MentalHealth(g) => g.is_complete(),
            Guidance::Nutrition(g) => g.is_complete(),
        }
    }
}
