//! Rule-based fallback path.
//!
//! `FallbackPlanner` turns a query into a fully populated result without any
//! external call. Every object it returns satisfies `Complete`; severity and
//! urgency always come from `classify_severity`, never from a table entry.

use std::sync::Arc;

use super::keywords::{classify_severity, crisis_detected};
use super::knowledge::FallbackKnowledgeBase;
use crate::models::enums::Severity;
use crate::models::guidance::{
    AdviceResult, EmergencyGuidance, Guidance, HealthPlan, Macronutrients, MentalHealthSupport,
    NutritionAnalysis, RiskAssessment, SymptomAnalysis,
};
use crate::models::query::{PlanQuery, Query, RiskQuery};

pub const STANDARD_DISCLAIMER: &str = "This information is general guidance only and is not a \
    substitute for professional medical advice. Consult a qualified healthcare professional \
    about your situation.";

pub const CONSULT_PROFESSIONAL: &str =
    "Consult a healthcare professional for an accurate assessment";

/// Always surfaced when self-harm or suicide is mentioned.
pub const CRISIS_RESOURCES: &[&str] = &[
    "If you are in immediate danger, call your local emergency number now",
    "Contact a crisis line, such as 988 in the US or Samaritans on 116 123 in the UK",
    "Reach out to someone you trust and tell them how you are feeling",
];

/// Placeholder daily estimate used when no analysis is available.
pub const PLACEHOLDER_CALORIES: u32 = 2_000;
pub const PLACEHOLDER_MACROS: Macronutrients = Macronutrients {
    protein_g: 75,
    carbohydrates_g: 250,
    fat_g: 65,
};

pub const NUTRITION_PLACEHOLDER_DISCLAIMER: &str = "Placeholder estimate for a typical adult \
    day, not an analysis of your meals. Ask a registered dietitian for personalised figures.";

/// Urgency wording for a severity tier.
pub fn urgency_for(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => {
            "Emergency: call your local emergency number or go to the nearest emergency department now"
        }
        Severity::High => "Urgent: seek medical care today",
        Severity::Medium => {
            "Soon: arrange to see a healthcare professional within a few days if symptoms persist"
        }
        Severity::Low => {
            "Routine: monitor your symptoms and consult a healthcare professional if they worsen"
        }
    }
}

/// Insert the crisis resources at the front of `resources`, skipping any
/// already present.
pub fn ensure_crisis_resources(resources: &mut Vec<String>) {
    let missing: Vec<String> = CRISIS_RESOURCES
        .iter()
        .filter(|r| !resources.iter().any(|existing| existing == *r))
        .map(|r| r.to_string())
        .collect();
    for (i, resource) in missing.into_iter().enumerate() {
        resources.insert(i, resource);
    }
}

fn push_unique(list: &mut Vec<String>, item: &str) {
    if !list.iter().any(|existing| existing.eq_ignore_ascii_case(item)) {
        list.push(item.to_string());
    }
}

fn joined_or_none(items: &[String]) -> Option<String> {
    let cleaned: Vec<&str> = items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.join(", "))
    }
}

#[derive(Debug, Clone)]
pub struct FallbackPlanner {
    knowledge: Arc<FallbackKnowledgeBase>,
}

impl FallbackPlanner {
    pub fn new(knowledge: Arc<FallbackKnowledgeBase>) -> Self {
        Self { knowledge }
    }

    /// Generic entry point: the always-valid result for any query.
    pub fn lookup_fallback(&self, query: &Query) -> Guidance {
        match query {
            Query::Symptom(q) => Guidance::Symptom(self.symptom_analysis(&q.symptoms)),
            Query::Risk(q) => Guidance::Risk(self.risk_assessment(q)),
            Query::Emergency(q) => Guidance::Emergency(self.emergency_guidance(&q.description)),
            Query::Plan(q) => Guidance::Plan(self.health_plan(q)),
            Query::Advice(q) => Guidance::Advice(self.health_advice(&q.text)),
            Query::MentalHealth(q) => {
                Guidance::MentalHealth(self.mental_health_support(&q.text))
            }
            Query::Nutrition(q) => Guidance::Nutrition(self.nutrition(&q.meal_descriptions)),
        }
    }

    /// Union of matched conditions (most severe first) and their
    /// recommendations.
    fn matched_conditions(&self, tokens: &[String]) -> (Vec<String>, Vec<String>) {
        let mut ranked: Vec<(String, Severity, Vec<String>)> = Vec::new();
        for entry in self.knowledge.matching_entries(tokens) {
            for (condition, severity) in entry.conditions_by_severity() {
                if ranked.iter().any(|(c, _, _)| c == condition) {
                    continue;
                }
                ranked.push((
                    condition.to_string(),
                    severity,
                    entry.recommendations_for(condition).to_vec(),
                ));
            }
        }
        ranked.sort_by(|a, b| b.1.cmp(&a.1));

        let mut conditions = Vec::new();
        let mut recommendations = Vec::new();
        for (condition, _, recs) in ranked {
            conditions.push(condition);
            for rec in recs {
                push_unique(&mut recommendations, &rec);
            }
        }
        (conditions, recommendations)
    }

    pub fn symptom_analysis(&self, symptoms: &[String]) -> SymptomAnalysis {
        let severity = classify_severity(symptoms);
        let (mut conditions, matched_recs) = self.matched_conditions(symptoms);
        if conditions.is_empty() {
            conditions.push(
                "Unable to identify a specific condition from the symptoms provided".to_string(),
            );
        }

        let mut recommendations = Vec::new();
        if severity >= Severity::High {
            push_unique(&mut recommendations, urgency_for(severity));
        }
        for rec in &matched_recs {
            push_unique(&mut recommendations, rec);
        }
        push_unique(&mut recommendations, CONSULT_PROFESSIONAL);

        SymptomAnalysis {
            possible_conditions: conditions,
            severity_level: severity,
            recommendations,
            urgency: urgency_for(severity).to_string(),
        }
    }

    pub fn risk_assessment(&self, query: &RiskQuery) -> RiskAssessment {
        let tokens = Query::Risk(query.clone()).tokens();
        let severity = classify_severity(&tokens);
        let (_, matched_recs) = self.matched_conditions(&tokens);

        let mut recommendations = Vec::new();
        if severity >= Severity::High {
            push_unique(&mut recommendations, urgency_for(severity));
        }
        for rec in &matched_recs {
            push_unique(&mut recommendations, rec);
        }
        if query.age >= 50 {
            push_unique(
                &mut recommendations,
                "Ask your doctor which age-appropriate screenings are due",
            );
        }
        if !query.lifestyle.is_empty() {
            push_unique(
                &mut recommendations,
                "Review lifestyle factors such as activity, diet, sleep and smoking with a professional",
            );
        }
        push_unique(
            &mut recommendations,
            "Schedule a check-up with a healthcare professional to review your risk factors",
        );

        RiskAssessment {
            risk: severity.as_str().to_string(),
            probability: "Unable to estimate without a professional assessment".to_string(),
            recommendations,
        }
    }

    /// Fails safe toward urgency: never below `High`.
    pub fn emergency_guidance(&self, description: &str) -> EmergencyGuidance {
        let severity = classify_severity(&[description]).max(Severity::High);

        let (assessment, immediate_actions) = if severity == Severity::Critical {
            (
                "Your description includes signs of a potentially life-threatening emergency. \
                 This is an automated safety response, not a professional assessment.",
                vec![
                    "Call your local emergency number now",
                    "Stay with the person and keep them as still and calm as possible",
                    "Follow the instructions of the emergency dispatcher",
                ],
            )
        } else {
            (
                "Your description suggests an injury or condition that needs prompt medical \
                 attention. This is an automated safety response, not a professional assessment.",
                vec![
                    "Call your local emergency number or go to the nearest emergency department \
                     if symptoms are severe or getting worse",
                    "Keep the affected area still and supported",
                    "Have someone stay with you until help arrives",
                ],
            )
        };

        EmergencyGuidance {
            severity,
            assessment: assessment.to_string(),
            immediate_actions: immediate_actions.into_iter().map(String::from).collect(),
            do_not_do: vec![
                "Do not drive yourself to the hospital".to_string(),
                "Do not eat or drink until you have been assessed".to_string(),
                "Do not ignore symptoms that are getting worse".to_string(),
            ],
        }
    }

    pub fn health_plan(&self, prefs: &PlanQuery) -> HealthPlan {
        let goals: Vec<String> = prefs
            .goals
            .iter()
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty())
            .collect();
        let goals = if goals.is_empty() {
            vec!["Improve overall health and wellbeing".to_string()]
        } else {
            goals
        };

        let mut diet_plan = vec![
            "Build meals around vegetables, fruit, whole grains and lean protein".to_string(),
            "Drink water regularly through the day".to_string(),
            "Limit processed foods and sugary drinks".to_string(),
        ];
        if let Some(restrictions) = joined_or_none(&prefs.dietary_restrictions) {
            diet_plan.push(format!("Respect your dietary restrictions: {restrictions}"));
        }

        let mut exercise_routine = Vec::new();
        if let Some(preferences) = joined_or_none(&prefs.exercise_preferences) {
            exercise_routine.push(format!("Build activity around what you enjoy: {preferences}"));
        }
        exercise_routine.push(
            "Aim for about 150 minutes of moderate activity a week, spread over several days"
                .to_string(),
        );
        exercise_routine.push("Include muscle-strengthening activity twice a week".to_string());

        let mut lifestyle_recommendations = vec![
            "Keep a regular sleep schedule of 7 to 9 hours".to_string(),
            "Make time for stress management such as walks or breathing exercises".to_string(),
        ];
        if let Some(lifestyle) = joined_or_none(&prefs.lifestyle) {
            lifestyle_recommendations
                .push(format!("Adapt changes to your current routine: {lifestyle}"));
        }
        if let Some(conditions) = joined_or_none(&prefs.medical_conditions) {
            lifestyle_recommendations.push(format!(
                "Review this plan with your doctor given your medical conditions: {conditions}"
            ));
        }

        HealthPlan {
            goals,
            diet_plan,
            exercise_routine,
            lifestyle_recommendations,
            progress_tracking: vec![
                "Check in on your goals once a week".to_string(),
                "Record meals, activity and sleep in a simple journal".to_string(),
                "Review progress with a healthcare professional every few months".to_string(),
            ],
        }
    }

    /// Consults the advice table before the generic text.
    pub fn health_advice(&self, text: &str) -> AdviceResult {
        match self.knowledge.advice_for(text) {
            Some(entry) => AdviceResult {
                advice: entry.advice.clone(),
                recommendations: entry
                    .recommendations
                    .iter()
                    .filter(|r| !r.trim().is_empty())
                    .cloned()
                    .collect(),
                disclaimer: STANDARD_DISCLAIMER.to_string(),
            },
            None => AdviceResult {
                advice: "Personalised advice is not available right now. For questions about \
                         your health, please speak with a qualified healthcare professional."
                    .to_string(),
                recommendations: vec![CONSULT_PROFESSIONAL.to_string()],
                disclaimer: STANDARD_DISCLAIMER.to_string(),
            },
        }
    }

    pub fn mental_health_support(&self, text: &str) -> MentalHealthSupport {
        let mut resources = vec![
            "Talk to your doctor about how you have been feeling".to_string(),
            "Ask about local counselling or talking-therapy services".to_string(),
        ];
        if crisis_detected(text) {
            ensure_crisis_resources(&mut resources);
        }

        MentalHealthSupport {
            support: "Thank you for sharing how you feel. What you are going through matters, \
                      and support is available."
                .to_string(),
            recommendations: vec![
                "Reach out to a mental health professional".to_string(),
                "Keep in touch with people you trust".to_string(),
            ],
            suggestions: vec![
                "Try a few minutes of slow, deep breathing".to_string(),
                "Keep a regular routine for sleep and meals".to_string(),
                "Spend some time outdoors or being active".to_string(),
            ],
            resources,
        }
    }

    pub fn nutrition(&self, meals: &[String]) -> NutritionAnalysis {
        let mut recommendations = vec![
            "Include a source of protein and vegetables with each meal".to_string(),
            "Choose whole grains over refined grains".to_string(),
        ];
        if meals.iter().all(|m| m.trim().is_empty()) {
            recommendations.push("Log your meals to get a more useful estimate".to_string());
        }

        NutritionAnalysis {
            calories: PLACEHOLDER_CALORIES,
            macros: PLACEHOLDER_MACROS,
            recommendations,
            disclaimer: NUTRITION_PLACEHOLDER_DISCLAIMER.to_string(),
        }
    }
}

impl Default for FallbackPlanner {
    fn default() -> Self {
        Self::new(Arc::new(FallbackKnowledgeBase::builtin()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::guidance::Complete;
    use crate::models::query::{
        AdviceQuery, EmergencyQuery, MentalHealthQuery, NutritionQuery, SymptomQuery,
    };

    fn planner() -> FallbackPlanner {
        FallbackPlanner::default()
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn symptom_fallback_uses_table_and_classifier() {
        let result = planner().symptom_analysis(&strings(&["headache", "fever"]));
        assert!(result.is_complete());
        assert_eq!(result.severity_level, Severity::Medium);
        assert!(result.possible_conditions.contains(&"Migraine".to_string()));
        assert!(result.possible_conditions.contains(&"Viral infection".to_string()));
        assert_eq!(result.urgency, urgency_for(Severity::Medium));
        assert_eq!(
            result.recommendations.last().map(String::as_str),
            Some(CONSULT_PROFESSIONAL)
        );
    }

    #[test]
    fn symptom_fallback_severity_ignores_table_severity() {
        // The table ranks "Possible cardiac event" as critical, but the
        // reported tier comes from the classifier for the same reason.
        let result = planner().symptom_analysis(&strings(&["chest pain"]));
        assert_eq!(result.severity_level, Severity::Critical);
        assert_eq!(result.possible_conditions[0], "Possible cardiac event");
        assert_eq!(result.recommendations[0], urgency_for(Severity::Critical));
    }

    #[test]
    fn unknown_symptoms_defer_to_professional() {
        let result = planner().symptom_analysis(&strings(&["tingly earlobes"]));
        assert!(result.is_complete());
        assert_eq!(result.severity_level, Severity::Low);
        assert_eq!(result.possible_conditions.len(), 1);
        assert!(result.recommendations.iter().any(|r| r == CONSULT_PROFESSIONAL));
    }

    #[test]
    fn emergency_fallback_defaults_to_high() {
        let result = planner().emergency_guidance("I fell and can't move my leg, it hurts a lot");
        assert_eq!(result.severity, Severity::High);
        assert!(result.is_complete());
    }

    #[test]
    fn emergency_fallback_never_below_high() {
        let result = planner().emergency_guidance("I feel a bit tired");
        assert_eq!(result.severity, Severity::High);
    }

    #[test]
    fn emergency_fallback_escalates_to_critical() {
        let result = planner().emergency_guidance("my father is unconscious");
        assert_eq!(result.severity, Severity::Critical);
        assert_eq!(result.immediate_actions[0], "Call your local emergency number now");
    }

    #[test]
    fn risk_fallback_reports_rule_tier() {
        let result = planner().risk_assessment(&RiskQuery {
            age: 62,
            symptoms: strings(&["shortness of breath"]),
            lifestyle: strings(&["smoker"]),
            ..Default::default()
        });
        assert!(result.is_complete());
        assert_eq!(result.risk, "CRITICAL");
        assert!(result
            .recommendations
            .iter()
            .any(|r| r.contains("screenings")));
    }

    #[test]
    fn plan_fallback_with_no_preferences() {
        let result = planner().health_plan(&PlanQuery::default());
        assert!(result.is_complete());
        assert_eq!(result.goals, vec!["Improve overall health and wellbeing"]);
    }

    #[test]
    fn plan_fallback_reflects_preferences() {
        let result = planner().health_plan(&PlanQuery {
            goals: strings(&["Lose 5 kg", "  "]),
            dietary_restrictions: strings(&["vegetarian"]),
            exercise_preferences: strings(&["swimming", "yoga"]),
            medical_conditions: strings(&["asthma"]),
            lifestyle: vec![],
        });
        assert_eq!(result.goals, vec!["Lose 5 kg"]);
        assert!(result.diet_plan.iter().any(|d| d.contains("vegetarian")));
        assert!(result.exercise_routine[0].contains("swimming, yoga"));
        assert!(result
            .lifestyle_recommendations
            .iter()
            .any(|l| l.contains("asthma")));
    }

    #[test]
    fn advice_fallback_prefers_keyword_table() {
        let result = planner().health_advice("I keep getting a headache at work");
        assert!(result.advice.contains("headaches"));
        assert!(result.is_complete());

        let generic = planner().health_advice("What about astronomy?");
        assert!(generic.advice.contains("healthcare professional"));
        assert!(generic.is_complete());
    }

    #[test]
    fn mental_health_fallback_adds_crisis_resources_when_needed() {
        let calm = planner().mental_health_support("work has been stressful");
        assert!(!calm.resources.iter().any(|r| r == CRISIS_RESOURCES[0]));

        let crisis = planner().mental_health_support("I have been thinking about suicide");
        assert_eq!(crisis.resources[0], CRISIS_RESOURCES[0]);
        assert!(crisis.is_complete());
    }

    #[test]
    fn ensure_crisis_resources_is_idempotent() {
        let mut resources = vec!["Existing".to_string()];
        ensure_crisis_resources(&mut resources);
        ensure_crisis_resources(&mut resources);
        assert_eq!(resources.len(), CRISIS_RESOURCES.len() + 1);
        assert_eq!(resources.last().map(String::as_str), Some("Existing"));
    }

    #[test]
    fn nutrition_fallback_is_a_labelled_placeholder() {
        let result = planner().nutrition(&strings(&["oatmeal with berries"]));
        assert_eq!(result.calories, PLACEHOLDER_CALORIES);
        assert_eq!(result.macros, PLACEHOLDER_MACROS);
        assert!(result.disclaimer.contains("Placeholder"));
        assert!(result.is_complete());
    }

    #[test]
    fn every_domain_fallback_is_complete() {
        let queries = vec![
            Query::Symptom(SymptomQuery { symptoms: vec![] }),
            Query::Risk(RiskQuery::default()),
            Query::Emergency(EmergencyQuery { description: String::new() }),
            Query::Plan(PlanQuery::default()),
            Query::Advice(AdviceQuery { text: String::new() }),
            Query::MentalHealth(MentalHealthQuery { text: String::new() }),
            Query::Nutrition(NutritionQuery { meal_descriptions: vec![] }),
        ];
        for query in queries {
            let guidance = planner().lookup_fallback(&query);
            assert!(guidance.is_complete(), "incomplete fallback for {:?}", query.domain());
        }
    }
}
