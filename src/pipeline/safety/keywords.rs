//! Severity Classifier.
//!
//! Maps free-text symptom tokens to one of four severity tiers using
//! case-insensitive substring matching against fixed keyword sets.
//! Precedence is critical > high > medium > low: one critical match
//! decides the result regardless of anything else in the input.
//!
//! The keyword sets are disjoint. Overlaps between a short keyword and a
//! longer one ("fever" / "high fever") are resolved by tier precedence,
//! never by table order.

use crate::models::enums::Severity;

// ── Keyword sets ────────────────────────────────────────────

static CRITICAL_KEYWORDS: &[&str] = &[
    "chest pain",
    "chest pressure",
    "chest tightness",
    "heart attack",
    "can't breathe",
    "cannot breathe",
    "not breathing",
    "difficulty breathing",
    "trouble breathing",
    "shortness of breath",
    "choking",
    "unconscious",
    "unresponsive",
    "passed out",
    "seizure",
    "convulsion",
    "stroke",
    "face drooping",
    "slurred speech",
    "sudden numbness",
    "paralysis",
    "severe bleeding",
    "bleeding heavily",
    "won't stop bleeding",
    "coughing up blood",
    "vomiting blood",
    "anaphylaxis",
    "throat swelling",
    "overdose",
    "poisoning",
    "suicidal",
    "suicide",
    "kill myself",
    "worst headache of my life",
];

static HIGH_KEYWORDS: &[&str] = &[
    "high fever",
    "severe pain",
    "severe headache",
    "severe abdominal pain",
    "hurts a lot",
    "broken",
    "fracture",
    "can't move",
    "cannot move",
    "dislocated",
    "head injury",
    "hit my head",
    "concussion",
    "deep cut",
    "burned",
    "scalded",
    "fainting",
    "fainted",
    "confusion",
    "confused",
    "blood in stool",
    "blood in urine",
    "stiff neck",
    "dehydrated",
    "dehydration",
    "allergic reaction",
    "swollen tongue",
    "blurred vision",
    "palpitations",
];

static MEDIUM_KEYWORDS: &[&str] = &[
    "fever",
    "vomiting",
    "diarrhea",
    "diarrhoea",
    "infection",
    "rash",
    "migraine",
    "persistent cough",
    "cough",
    "dizziness",
    "dizzy",
    "swelling",
    "sprain",
    "earache",
    "ear pain",
    "sore throat",
    "abdominal pain",
    "stomach pain",
    "back pain",
    "pain",
    "nausea",
    "chills",
    "wheezing",
];

/// Self-harm and suicide phrases that always surface crisis resources.
static CRISIS_KEYWORDS: &[&str] = &[
    "suicide",
    "suicidal",
    "kill myself",
    "end my life",
    "ending my life",
    "want to die",
    "self-harm",
    "self harm",
    "hurt myself",
    "harming myself",
    "no reason to live",
];

/// Lowercase and fold typographic apostrophes so "can’t" matches "can't".
fn normalize(token: &str) -> String {
    token.to_lowercase().replace(['\u{2019}', '\u{2018}'], "'")
}

fn matches_any(normalized: &[String], keywords: &[&str]) -> bool {
    normalized
        .iter()
        .any(|token| keywords.iter().any(|k| token.contains(k)))
}

/// Classify a set of symptom tokens into a severity tier.
///
/// Pure and total: an empty input, or one that matches nothing, is `Low`.
pub fn classify_severity<S: AsRef<str>>(tokens: &[S]) -> Severity {
    let normalized: Vec<String> = tokens.iter().map(|t| normalize(t.as_ref())).collect();

    if matches_any(&normalized, CRITICAL_KEYWORDS) {
        return Severity::Critical;
    }
    if matches_any(&normalized, HIGH_KEYWORDS) {
        return Severity::High;
    }
    if matches_any(&normalized, MEDIUM_KEYWORDS) {
        return Severity::Medium;
    }
    Severity::Low
}

/// Whether the text mentions self-harm or suicide.
pub fn crisis_detected(text: &str) -> bool {
    let normalized = normalize(text);
    CRISIS_KEYWORDS.iter().any(|k| normalized.contains(k))
}
