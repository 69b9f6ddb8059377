use serde::{Deserialize, Serialize};

use super::enums::GuidanceDomain;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymptomQuery {
    pub symptoms: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskQuery {
    pub age: u32,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub medical_history: Vec<String>,
    #[serde(default)]
    pub lifestyle: Vec<String>,
    #[serde(default)]
    pub medical_conditions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyQuery {
    pub description: String,
}

/// Health-plan preferences. Every field is optional; empty lists are
/// rendered as "none specified" in the prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanQuery {
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub dietary_restrictions: Vec<String>,
    #[serde(default)]
    pub exercise_preferences: Vec<String>,
    #[serde(default)]
    pub medical_conditions: Vec<String>,
    #[serde(default)]
    pub lifestyle: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdviceQuery {
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentalHealthQuery {
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NutritionQuery {
    pub meal_descriptions: Vec<String>,
}

/// One variant per facade operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Query {
    Symptom(SymptomQuery),
    Risk(RiskQuery),
    Emergency(EmergencyQuery),
    Plan(PlanQuery),
    Advice(AdviceQuery),
    MentalHealth(MentalHealthQuery),
    Nutrition(NutritionQuery),
}

impl Query {
    pub fn domain(&self) -> GuidanceDomain {
        match self {
            Query::Symptom(_) => GuidanceDomain::Symptom,
            Query::Risk(_) => GuidanceDomain::Risk,
            Query::Emergency(_) => GuidanceDomain::Emergency,
            Query::Plan(_) => GuidanceDomain::Plan,
            Query::Advice(_) => GuidanceDomain::Advice,
            Query::MentalHealth(_) => GuidanceDomain::MentalHealth,
            Query::Nutrition(_) => GuidanceDomain::Nutrition,
        }
    }

    /// Free-text tokens the severity classifier and the knowledge base
    /// look at for this query.
    pub fn tokens(&self) -> Vec<String> {
        match self {
            Query::Symptom(q) => q.symptoms.clone(),
            Query::Risk(q) => q
                .symptoms
                .iter()
                .chain(&q.medical_conditions)
                .chain(&q.medical_history)
                .cloned()
                .collect(),
            Query::Emergency(q) => vec![q.description.clone()],
            Query::Plan(q) => q
                .goals
                .iter()
                .chain(&q.medical_conditions)
                .cloned()
                .collect(),
            Query::Advice(q) => vec![q.text.clone()],
            Query::MentalHealth(q) => vec![q.text.clone()],
            Query::Nutrition(q) => q.meal_descriptions.clone(),
        }
    }
}
