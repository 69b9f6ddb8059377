use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;
use uuid::Uuid;

use super::cancel::CancellationToken;
use super::client::{GeminiClient, GenerationClient};
use super::parser::extract;
use super::prompt::build_prompt_with_limit;
use super::schema::{schema_for, FromExtraction};
use super::GuidanceError;
use crate::config::{GenerationConfig, DEFAULT_MAX_INPUT_CHARS, DEFAULT_TIMEOUT};
use crate::models::enums::Severity;
use crate::models::guidance::{
    AdviceResult, Complete, EmergencyGuidance, Guidance, HealthPlan, MentalHealthSupport,
    NutritionAnalysis, RiskAssessment, SymptomAnalysis,
};
use crate::models::query::{
    AdviceQuery, EmergencyQuery, MentalHealthQuery, NutritionQuery, PlanQuery, Query, RiskQuery,
    SymptomQuery,
};
use crate::pipeline::safety::fallback::{ensure_crisis_resources, urgency_for, FallbackPlanner};
use crate::pipeline::safety::keywords::{classify_severity, crisis_detected};

/// Health guidance facade:
/// prompt → generate → extract → safety floor → completeness check,
/// falling back to the rule-based planner on any failure.
///
/// Every operation returns a complete result; none of them fail.
pub struct HealthGuidanceService {
    client: Arc<dyn GenerationClient>,
    planner: FallbackPlanner,
    timeout: Duration,
    max_input_chars: usize,
}

impl HealthGuidanceService {
    pub fn new(client: Arc<dyn GenerationClient>, planner: FallbackPlanner) -> Self {
        Self {
            client,
            planner,
            timeout: DEFAULT_TIMEOUT,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_input_chars(mut self, max_input_chars: usize) -> Self {
        self.max_input_chars = max_input_chars;
        self
    }

    /// Service backed by the HTTP generation client and the built-in
    /// knowledge base.
    pub fn from_config(config: &GenerationConfig) -> Result<Self, GuidanceError> {
        let client = GeminiClient::new(config)?;
        Ok(Self::new(Arc::new(client), FallbackPlanner::default())
            .with_timeout(config.timeout)
            .with_max_input_chars(config.max_input_chars))
    }

    pub fn from_env() -> Result<Self, GuidanceError> {
        Self::from_config(&GenerationConfig::from_env()?)
    }

    pub fn planner(&self) -> &FallbackPlanner {
        &self.planner
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    // ── Operations ──────────────────────────────────────────

    pub async fn get_symptom_analysis(
        &self,
        symptoms: &[String],
        cancel: &CancellationToken,
    ) -> SymptomAnalysis {
        let floor = classify_severity(symptoms);
        let query = Query::Symptom(SymptomQuery {
            symptoms: symptoms.to_vec(),
        });
        self.resolve(
            &query,
            cancel,
            |analysis| raise_symptom_severity(analysis, floor),
            |planner| planner.symptom_analysis(symptoms),
        )
        .await
    }

    pub async fn assess_health_risks(
        &self,
        risk: &RiskQuery,
        cancel: &CancellationToken,
    ) -> RiskAssessment {
        let query = Query::Risk(risk.clone());
        let floor = classify_severity(&query.tokens());
        self.resolve(
            &query,
            cancel,
            |assessment| raise_risk_tier(assessment, floor),
            |planner| planner.risk_assessment(risk),
        )
        .await
    }

    pub async fn get_emergency_guidance(
        &self,
        description: &str,
        cancel: &CancellationToken,
    ) -> EmergencyGuidance {
        let floor = classify_severity(&[description]);
        let query = Query::Emergency(EmergencyQuery {
            description: description.to_string(),
        });
        self.resolve(
            &query,
            cancel,
            |mut guidance: EmergencyGuidance| {
                if guidance.severity < floor {
                    tracing::info!(
                        model = %guidance.severity,
                        rule = %floor,
                        "Raising emergency severity"
                    );
                    guidance.severity = floor;
                }
                guidance
            },
            |planner| planner.emergency_guidance(description),
        )
        .await
    }

    pub async fn generate_health_plan(
        &self,
        preferences: &PlanQuery,
        cancel: &CancellationToken,
    ) -> HealthPlan {
        let query = Query::Plan(preferences.clone());
        self.resolve(
            &query,
            cancel,
            |plan| plan,
            |planner| planner.health_plan(preferences),
        )
        .await
    }

    pub async fn get_health_advice(&self, text: &str, cancel: &CancellationToken) -> AdviceResult {
        let query = Query::Advice(AdviceQuery {
            text: text.to_string(),
        });
        self.resolve(
            &query,
            cancel,
            |advice| advice,
            |planner| planner.health_advice(text),
        )
        .await
    }

    pub async fn get_mental_health_support(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> MentalHealthSupport {
        let crisis = crisis_detected(text);
        let query = Query::MentalHealth(MentalHealthQuery {
            text: text.to_string(),
        });
        self.resolve(
            &query,
            cancel,
            |mut support: MentalHealthSupport| {
                if crisis {
                    ensure_crisis_resources(&mut support.resources);
                }
                support
            },
            |planner| planner.mental_health_support(text),
        )
        .await
    }

    pub async fn analyze_nutrition(
        &self,
        meal_descriptions: &[String],
        cancel: &CancellationToken,
    ) -> NutritionAnalysis {
        let query = Query::Nutrition(NutritionQuery {
            meal_descriptions: meal_descriptions.to_vec(),
        });
        self.resolve(
            &query,
            cancel,
            |analysis| analysis,
            |planner| planner.nutrition(meal_descriptions),
        )
        .await
    }

    /// Dispatch a tagged query to the matching operation.
    pub async fn respond(&self, query: &Query, cancel: &CancellationToken) -> Guidance {
        match query {
            Query::Symptom(q) => {
                Guidance::Symptom(self.get_symptom_analysis(&q.symptoms, cancel).await)
            }
            Query::Risk(q) => Guidance::Risk(self.assess_health_risks(q, cancel).await),
            Query::Emergency(q) => {
                Guidance::Emergency(self.get_emergency_guidance(&q.description, cancel).await)
            }
            Query::Plan(q) => Guidance::Plan(self.generate_health_plan(q, cancel).await),
            Query::Advice(q) => Guidance::Advice(self.get_health_advice(&q.text, cancel).await),
            Query::MentalHealth(q) => {
                Guidance::MentalHealth(self.get_mental_health_support(&q.text, cancel).await)
            }
            Query::Nutrition(q) => {
                Guidance::Nutrition(self.analyze_nutrition(&q.meal_descriptions, cancel).await)
            }
        }
    }

    // ── Shared pipeline ─────────────────────────────────────

    async fn resolve<T, R, F>(
        &self,
        query: &Query,
        cancel: &CancellationToken,
        refine: R,
        fallback: F,
    ) -> T
    where
        T: FromExtraction + Complete,
        R: FnOnce(T) -> T,
        F: FnOnce(&FallbackPlanner) -> T,
    {
        let span = tracing::info_span!(
            "guidance",
            domain = %T::DOMAIN,
            request_id = %Uuid::new_v4()
        );

        async {
            if !has_content(query) {
                tracing::debug!("Empty input, using rule-based guidance");
                return fallback(&self.planner);
            }

            let result = self
                .generate_structured::<T>(query, cancel)
                .await
                .map(refine)
                .and_then(ensure_complete);

            match result {
                Ok(guidance) => {
                    tracing::info!("Model guidance accepted");
                    guidance
                }
                Err(e) if e.is_cancelled() => {
                    tracing::debug!("Request cancelled, using rule-based guidance");
                    fallback(&self.planner)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Falling back to rule-based guidance");
                    fallback(&self.planner)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn generate_structured<T: FromExtraction>(
        &self,
        query: &Query,
        cancel: &CancellationToken,
    ) -> Result<T, GuidanceError> {
        let prompt = build_prompt_with_limit(query, self.max_input_chars);
        let raw = self
            .client
            .generate(&prompt, self.timeout, cancel)
            .await
            .into_result()?;
        let extraction = extract(&raw, schema_for(T::DOMAIN))?;
        tracing::debug!(phase = ?extraction.phase, "Extracted structured fields");
        T::from_extraction(&extraction)
    }
}

fn ensure_complete<T: FromExtraction + Complete>(value: T) -> Result<T, GuidanceError> {
    if value.is_complete() {
        Ok(value)
    } else {
        Err(GuidanceError::Validation {
            domain: T::DOMAIN,
            reason: "required field is blank".to_string(),
        })
    }
}

/// Queries whose only input is blank go straight to the fallback path.
fn has_content(query: &Query) -> bool {
    let any_filled = |items: &[String]| items.iter().any(|i| !i.trim().is_empty());
    match query {
        Query::Symptom(q) => any_filled(&q.symptoms),
        Query::Emergency(q) => !q.description.trim().is_empty(),
        Query::Advice(q) => !q.text.trim().is_empty(),
        Query::MentalHealth(q) => !q.text.trim().is_empty(),
        Query::Nutrition(q) => any_filled(&q.meal_descriptions),
        Query::Risk(_) | Query::Plan(_) => true,
    }
}

/// Keyword tier is a floor on the reported severity.
fn raise_symptom_severity(mut analysis: SymptomAnalysis, floor: Severity) -> SymptomAnalysis {
    if analysis.severity_level < floor {
        tracing::info!(
            model = %analysis.severity_level,
            rule = %floor,
            "Raising symptom severity"
        );
        analysis.severity_level = floor;
        analysis.urgency = urgency_for(floor).to_string();
        if floor >= Severity::High {
            analysis.recommendations.insert(0, urgency_for(floor).to_string());
        }
    }
    analysis
}

/// Risk text is only rewritten when it is exactly a tier name below the
/// keyword tier; descriptive text is left alone.
fn raise_risk_tier(mut assessment: RiskAssessment, floor: Severity) -> RiskAssessment {
    if let Ok(model) = assessment.risk.trim().parse::<Severity>() {
        if model < floor {
            tracing::info!(model = %model, rule = %floor, "Raising risk tier");
            assessment.risk = floor.as_str().to_string();
        }
    }
    assessment
}
