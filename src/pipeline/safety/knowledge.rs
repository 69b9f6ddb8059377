//! Fallback Knowledge Base.
//!
//! Immutable keyword → {conditions, severity, recommendations} table plus a
//! keyword → advice table. Built once (either `builtin()` or `from_json`) and
//! shared behind an `Arc`; there are no mutating methods.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::enums::Severity;

/// One keyword pattern and the conditions it points to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackEntry {
    /// Lowercase substring matched against user input.
    pub keyword: String,
    pub conditions: Vec<String>,
    pub severity_by_condition: BTreeMap<String, Severity>,
    pub recommendations_by_condition: BTreeMap<String, Vec<String>>,
}

impl FallbackEntry {
    /// Conditions ordered most severe first, then in table order.
    pub fn conditions_by_severity(&self) -> Vec<(&str, Severity)> {
        let mut ranked: Vec<(&str, Severity)> = self
            .conditions
            .iter()
            .map(|c| {
                let severity = self
                    .severity_by_condition
                    .get(c)
                    .copied()
                    .unwrap_or(Severity::Low);
                (c.as_str(), severity)
            })
            .collect();
        // Stable sort keeps table order within a tier.
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
    }

    pub fn recommendations_for(&self, condition: &str) -> &[String] {
        self.recommendations_by_condition
            .get(condition)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Keyword → general advice text, used by the advice fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdviceEntry {
    pub keyword: String,
    pub advice: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackKnowledgeBase {
    entries: Vec<FallbackEntry>,
    advice: Vec<AdviceEntry>,
}

#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    #[error("Knowledge base JSON is invalid: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Knowledge base entry '{0}' has no conditions")]
    EmptyEntry(String),

    #[error("Knowledge base entry '{keyword}' has no recommendations for '{condition}'")]
    MissingRecommendations { keyword: String, condition: String },

    #[error("Knowledge base has an entry with a blank keyword")]
    BlankKeyword,

    #[error("Knowledge base entry '{0}' has a blank condition")]
    BlankCondition(String),

    #[error("Knowledge base entry '{keyword}' has a blank recommendation for '{condition}'")]
    BlankRecommendation { keyword: String, condition: String },

    #[error("Advice entry '{0}' has no advice text")]
    BlankAdvice(String),
}

fn normalize(text: &str) -> String {
    text.to_lowercase().replace(['\u{2019}', '\u{2018}'], "'")
}

impl FallbackKnowledgeBase {
    /// Build from explicit tables. Keywords are lowercased and must not be
    /// blank (an empty keyword would match every input). Entries must carry
    /// at least one non-blank condition, each with at least one recommendation,
    /// and no recommendation or advice text may be blank.
    pub fn new(
        entries: Vec<FallbackEntry>,
        advice: Vec<AdviceEntry>,
    ) -> Result<Self, KnowledgeError> {
        let mut entries = entries;
        for entry in &mut entries {
            entry.keyword = normalize(entry.keyword.trim());
            if entry.keyword.is_empty() {
                return Err(KnowledgeError::BlankKeyword);
            }
            if entry.conditions.is_empty() {
                return Err(KnowledgeError::EmptyEntry(entry.keyword.clone()));
            }
            for condition in &entry.conditions {
                if condition.trim().is_empty() {
                    return Err(KnowledgeError::BlankCondition(entry.keyword.clone()));
                }
                let recommendations = entry.recommendations_for(condition);
                if recommendations.is_empty() {
                    return Err(KnowledgeError::MissingRecommendations {
                        keyword: entry.keyword.clone(),
                        condition: condition.clone(),
                    });
                }
                if recommendations.iter().any(|r| r.trim().is_empty()) {
                    return Err(KnowledgeError::BlankRecommendation {
                        keyword: entry.keyword.clone(),
                        condition: condition.clone(),
                    });
                }
            }
        }
        let mut advice = advice;
        for a in &mut advice {
            a.keyword = normalize(a.keyword.trim());
            if a.keyword.is_empty() {
                return Err(KnowledgeError::BlankKeyword);
            }
            if a.advice.trim().is_empty() {
                return Err(KnowledgeError::BlankAdvice(a.keyword.clone()));
            }
            a.recommendations.retain(|r| !r.trim().is_empty());
        }
        Ok(Self { entries, advice })
    }

    /// Load a deployment-specific table from JSON
    /// (`{"entries": [...], "advice": [...]}`).
    pub fn from_json(json: &str) -> Result<Self, KnowledgeError> {
        let raw: FallbackKnowledgeBase = serde_json::from_str(json)?;
        Self::new(raw.entries, raw.advice)
    }

    pub fn entries(&self) -> &[FallbackEntry] {
        &self.entries
    }

    pub fn advice_entries(&self) -> &[AdviceEntry] {
        &self.advice
    }

    /// Entries whose keyword is contained in any input token, in table order,
    /// each entry at most once.
    pub fn matching_entries<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<&FallbackEntry> {
        let normalized: Vec<String> = tokens.iter().map(|t| normalize(t.as_ref())).collect();
        self.entries
            .iter()
            .filter(|e| normalized.iter().any(|t| t.contains(&e.keyword)))
            .collect()
    }

    /// First advice entry whose keyword appears in the text.
    pub fn advice_for(&self, text: &str) -> Option<&AdviceEntry> {
        let normalized = normalize(text);
        self.advice.iter().find(|a| normalized.contains(&a.keyword))
    }

    /// The table shipped with the crate.
    pub fn builtin() -> Self {
        Self {
            entries: builtin_entries(),
            advice: builtin_advice(),
        }
    }
}

impl Default for FallbackKnowledgeBase {
    fn default() -> Self {
        Self::builtin()
    }
}

// ── Built-in tables ─────────────────────────────────────────

fn entry(keyword: &str, conditions: &[(&str, Severity, &[&str])]) -> FallbackEntry {
    let mut severity_by_condition = BTreeMap::new();
    let mut recommendations_by_condition = BTreeMap::new();
    for (condition, severity, recs) in conditions {
        severity_by_condition.insert(condition.to_string(), *severity);
        recommendations_by_condition.insert(
            condition.to_string(),
            recs.iter().map(|r| r.to_string()).collect(),
        );
    }
    FallbackEntry {
        keyword: keyword.to_string(),
        conditions: conditions.iter().map(|(c, _, _)| c.to_string()).collect(),
        severity_by_condition,
        recommendations_by_condition,
    }
}

fn builtin_entries() -> Vec<FallbackEntry> {
    use Severity::*;
    vec![
        entry(
            "chest pain",
            &[
                (
                    "Possible cardiac event",
                    Critical,
                    &["Call emergency services now", "Chew an aspirin only if advised by a professional"],
                ),
                (
                    "Muscle strain",
                    Low,
                    &["Avoid strenuous activity until a professional has assessed the pain"],
                ),
            ],
        ),
        entry(
            "headache",
            &[
                (
                    "Tension headache",
                    Low,
                    &["Rest in a quiet, dark room", "Stay hydrated"],
                ),
                (
                    "Migraine",
                    Medium,
                    &["Limit screen time and bright light", "Keep a headache diary"],
                ),
            ],
        ),
        entry(
            "fever",
            &[
                (
                    "Viral infection",
                    Medium,
                    &["Rest and drink plenty of fluids", "Monitor your temperature"],
                ),
                (
                    "Bacterial infection",
                    Medium,
                    &["See a doctor if the fever lasts more than three days"],
                ),
            ],
        ),
        entry(
            "cough",
            &[
                (
                    "Common cold",
                    Low,
                    &["Drink warm fluids", "Rest"],
                ),
                (
                    "Bronchitis",
                    Medium,
                    &["See a doctor if the cough lasts more than three weeks"],
                ),
            ],
        ),
        entry(
            "sore throat",
            &[
                (
                    "Pharyngitis",
                    Low,
                    &["Gargle with warm salt water", "Drink warm fluids"],
                ),
                (
                    "Strep throat",
                    Medium,
                    &["See a doctor for a throat swab if fever is present"],
                ),
            ],
        ),
        entry(
            "nausea",
            &[
                (
                    "Gastroenteritis",
                    Medium,
                    &["Sip clear fluids", "Eat bland foods once tolerated"],
                ),
                (
                    "Food intolerance",
                    Low,
                    &["Note which foods trigger symptoms"],
                ),
            ],
        ),
        entry(
            "stomach",
            &[
                (
                    "Indigestion",
                    Low,
                    &["Eat smaller meals", "Avoid lying down right after eating"],
                ),
                (
                    "Appendicitis",
                    High,
                    &["Seek urgent care if pain moves to the lower right abdomen"],
                ),
            ],
        ),
        entry(
            "dizz",
            &[
                (
                    "Dehydration",
                    Medium,
                    &["Drink water and sit or lie down"],
                ),
                (
                    "Inner ear disorder",
                    Low,
                    &["Avoid sudden head movements"],
                ),
            ],
        ),
        entry(
            "rash",
            &[
                (
                    "Contact dermatitis",
                    Low,
                    &["Avoid the suspected irritant", "Use a gentle moisturiser"],
                ),
                (
                    "Allergic reaction",
                    High,
                    &["Seek urgent care if the rash spreads quickly or breathing is affected"],
                ),
            ],
        ),
        entry(
            "back pain",
            &[
                (
                    "Muscle strain",
                    Low,
                    &["Keep gently active", "Apply heat to the area"],
                ),
                (
                    "Disc problem",
                    Medium,
                    &["See a doctor if pain spreads down the leg"],
                ),
            ],
        ),
        entry(
            "tired",
            &[
                (
                    "Sleep deprivation",
                    Low,
                    &["Keep a regular sleep schedule"],
                ),
                (
                    "Anaemia",
                    Medium,
                    &["Ask a doctor about a blood test if tiredness persists"],
                ),
            ],
        ),
        entry(
            "breath",
            &[
                (
                    "Asthma",
                    High,
                    &["Use your reliever inhaler if you have one", "Sit upright"],
                ),
                (
                    "Respiratory infection",
                    Medium,
                    &["See a doctor promptly"],
                ),
            ],
        ),
    ]
}

fn advice(keyword: &str, text: &str, recs: &[&str]) -> AdviceEntry {
    AdviceEntry {
        keyword: keyword.to_string(),
        advice: text.to_string(),
        recommendations: recs.iter().map(|r| r.to_string()).collect(),
    }
}

fn builtin_advice() -> Vec<AdviceEntry> {
    vec![
        advice(
            "headache",
            "Most headaches improve with rest, fluids and a break from screens. \
             A sudden, severe or unusual headache needs prompt medical attention.",
            &["Drink a glass of water", "Rest in a quiet room"],
        ),
        advice(
            "fever",
            "A mild fever is usually the body fighting an infection. Rest, drink fluids \
             and monitor your temperature.",
            &["Check your temperature every few hours", "See a doctor if it lasts over three days"],
        ),
        advice(
            "cold",
            "Colds usually clear up within a week to ten days. Rest and warm fluids help \
             with comfort.",
            &["Rest", "Drink warm fluids"],
        ),
        advice(
            "cough",
            "Most coughs clear up on their own within three weeks. Honey and warm drinks \
             can soothe the throat.",
            &["Stay hydrated", "See a doctor if you cough up blood or feel short of breath"],
        ),
        advice(
            "sleep",
            "Regular sleep and wake times, a dark quiet room and avoiding caffeine late in \
             the day support better sleep.",
            &["Keep a consistent bedtime", "Avoid screens an hour before bed"],
        ),
        advice(
            "stress",
            "Short breaks, physical activity and talking to someone you trust can reduce \
             stress.",
            &["Try a few minutes of slow breathing", "Take a short walk"],
        ),
        advice(
            "diet",
            "A balanced diet with vegetables, fruit, whole grains and lean protein supports \
             overall health.",
            &["Fill half your plate with vegetables", "Limit sugary drinks"],
        ),
        advice(
            "exercise",
            "Adults benefit from about 150 minutes of moderate activity a week, spread over \
             several days.",
            &["Start with short walks", "Increase activity gradually"],
        ),
        advice(
            "weight",
            "Sustainable weight changes come from steady habits in eating, activity and sleep \
             rather than rapid diets.",
            &["Set small, realistic goals"],
        ),
        advice(
            "water",
            "Most adults need around 6 to 8 glasses of fluid a day, more in hot weather or \
             during exercise.",
            &["Keep a water bottle nearby"],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_is_well_formed() {
        let kb = FallbackKnowledgeBase::builtin();
        assert!(!kb.entries().is_empty());
        // Re-validating the builtin tables through `new` must succeed.
        let rebuilt =
            FallbackKnowledgeBase::new(kb.entries().to_vec(), kb.advice_entries().to_vec())
                .unwrap();
        assert_eq!(rebuilt, kb);
    }

    #[test]
    fn matches_by_case_insensitive_substring() {
        let kb = FallbackKnowledgeBase::builtin();
        let matches = kb.matching_entries(&["Throbbing HEADACHE since noon"]);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].keyword, "headache");
    }

    #[test]
    fn entry_matched_once_across_tokens() {
        let kb = FallbackKnowledgeBase::builtin();
        let matches = kb.matching_entries(&["fever", "high fever at night"]);
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn unknown_tokens_match_nothing() {
        let kb = FallbackKnowledgeBase::builtin();
        assert!(kb.matching_entries(&["itchy elbow"]).is_empty());
    }

    #[test]
    fn conditions_ranked_most_severe_first() {
        let kb = FallbackKnowledgeBase::builtin();
        let chest = kb.matching_entries(&["chest pain"])[0];
        let ranked = chest.conditions_by_severity();
        assert_eq!(ranked[0], ("Possible cardiac event", Severity::Critical));
        assert_eq!(ranked[1].1, Severity::Low);
    }

    #[test]
    fn advice_lookup() {
        let kb = FallbackKnowledgeBase::builtin();
        let found = kb.advice_for("How can I sleep better?").unwrap();
        assert_eq!(found.keyword, "sleep");
        assert!(kb.advice_for("tell me about astronomy").is_none());
    }

    #[test]
    fn from_json_loads_and_normalizes_keywords() {
        let json = r#"{
            "entries": [{
                "keyword": "Earache",
                "conditions": ["Ear infection"],
                "severity_by_condition": {"Ear infection": "MEDIUM"},
                "recommendations_by_condition": {"Ear infection": ["See a GP"]}
            }],
            "advice": [{"keyword": "Ears", "advice": "Keep ears dry."}]
        }"#;
        let kb = FallbackKnowledgeBase::from_json(json).unwrap();
        assert_eq!(kb.entries()[0].keyword, "earache");
        assert_eq!(kb.matching_entries(&["bad earache"]).len(), 1);
        assert!(kb.advice_for("my EARS hurt").is_some());
    }

    #[test]
    fn from_json_rejects_condition_without_recommendations() {
        let json = r#"{
            "entries": [{
                "keyword": "x",
                "conditions": ["Y"],
                "severity_by_condition": {},
                "recommendations_by_condition": {}
            }],
            "advice": []
        }"#;
        assert!(matches!(
            FallbackKnowledgeBase::from_json(json),
            Err(KnowledgeError::MissingRecommendations { .. })
        ));
    }

    #[test]
    fn from_json_rejects_malformed_input() {
        assert!(matches!(
            FallbackKnowledgeBase::from_json("{not json"),
            Err(KnowledgeError::Json(_))
        ));
    }

    fn single_entry_json(keyword: &str, condition: &str, recommendation: &str) -> String {
        serde_json::json!({
            "entries": [{
                "keyword": keyword,
                "conditions": [condition],
                "severity_by_condition": {},
                "recommendations_by_condition": { condition: [recommendation] }
            }],
            "advice": []
        })
        .to_string()
    }

    #[test]
    fn from_json_rejects_blank_keyword() {
        assert!(matches!(
            FallbackKnowledgeBase::from_json(&single_entry_json("  ", "Fatigue", "Rest")),
            Err(KnowledgeError::BlankKeyword)
        ));
    }

    #[test]
    fn from_json_rejects_blank_condition() {
        assert!(matches!(
            FallbackKnowledgeBase::from_json(&single_entry_json("tired", "", "Rest")),
            Err(KnowledgeError::BlankCondition(_))
        ));
    }

    #[test]
    fn from_json_rejects_blank_recommendation() {
        assert!(matches!(
            FallbackKnowledgeBase::from_json(&single_entry_json("tired", "Fatigue", " ")),
            Err(KnowledgeError::BlankRecommendation { .. })
        ));
    }

    #[test]
    fn from_json_rejects_blank_advice_keyword_and_text() {
        let blank_keyword = r#"{"entries": [], "advice": [{"keyword": "", "advice": "Rest."}]}"#;
        assert!(matches!(
            FallbackKnowledgeBase::from_json(blank_keyword),
            Err(KnowledgeError::BlankKeyword)
        ));
        let blank_text = r#"{"entries": [], "advice": [{"keyword": "sleep", "advice": ""}]}"#;
        assert!(matches!(
            FallbackKnowledgeBase::from_json(blank_text),
            Err(KnowledgeError::BlankAdvice(_))
        ));
    }
}
