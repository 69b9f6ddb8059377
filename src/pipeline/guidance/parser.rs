//! Two-phase extraction of structured fields from free-form model text.
//!
//! Phase one looks for a JSON object (optionally inside code fences or
//! surrounded by prose). Phase two, used when no JSON object yields every
//! required field, splits the text into blocks under recognized section
//! headings. The phases are not merged: a result comes from one or the
//! other, and `Extraction::phase` reports which.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::models::enums::{GuidanceDomain, Severity};

use super::schema::{schema_for, DomainSchema, FieldKind, FieldSpec};
use super::GuidanceError;

/// Upper bound on candidate `{` positions tried in the JSON phase.
const MAX_JSON_CANDIDATES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionPhase {
    Json,
    Headings,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
    Severity(Severity),
    Number(f64),
}

/// Fields extracted for one domain. Every required field of the schema is
/// present.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub domain: GuidanceDomain,
    pub phase: ExtractionPhase,
    values: BTreeMap<&'static str, FieldValue>,
}

impl Extraction {
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(FieldValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn list(&self, key: &str) -> Option<&[String]> {
        match self.values.get(key) {
            Some(FieldValue::List(items)) => Some(items),
            _ => None,
        }
    }

    pub fn severity(&self, key: &str) -> Option<Severity> {
        match self.values.get(key) {
            Some(FieldValue::Severity(severity)) => Some(*severity),
            _ => None,
        }
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        match self.values.get(key) {
            Some(FieldValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn require_text(&self, key: &str) -> Result<String, GuidanceError> {
        self.text(key)
            .map(str::to_string)
            .ok_or_else(|| self.missing(key))
    }

    pub fn require_list(&self, key: &str) -> Result<Vec<String>, GuidanceError> {
        self.list(key)
            .map(<[String]>::to_vec)
            .ok_or_else(|| self.missing(key))
    }

    pub fn require_severity(&self, key: &str) -> Result<Severity, GuidanceError> {
        self.severity(key).ok_or_else(|| self.missing(key))
    }

    pub fn require_number(&self, key: &str) -> Result<f64, GuidanceError> {
        self.number(key).ok_or_else(|| self.missing(key))
    }

    fn missing(&self, key: &str) -> GuidanceError {
        GuidanceError::Parse {
            domain: self.domain,
            missing: vec![key.to_string()],
        }
    }
}

/// Extract the schema's fields from raw model output.
///
/// Returns `GuidanceError::Parse` naming the required fields the heading
/// phase could not populate when neither phase succeeds.
pub fn extract(raw: &str, schema: &DomainSchema) -> Result<Extraction, GuidanceError> {
    let text = raw.replace("\r\n", "\n");

    match extract_json(&text, schema) {
        Some(Ok(values)) => {
            return Ok(Extraction {
                domain: schema.domain,
                phase: ExtractionPhase::Json,
                values,
            })
        }
        Some(Err(missing)) => {
            tracing::debug!(?missing, "JSON object incomplete, trying section headings");
        }
        None => {}
    }

    let values = extract_headings(&text, schema);
    let missing = missing_required(&values, schema);
    if missing.is_empty() {
        Ok(Extraction {
            domain: schema.domain,
            phase: ExtractionPhase::Headings,
            values,
        })
    } else {
        Err(GuidanceError::Parse {
            domain: schema.domain,
            missing,
        })
    }
}

/// Convenience wrapper looking up the domain's schema.
pub fn extract_for(raw: &str, domain: GuidanceDomain) -> Result<Extraction, GuidanceError> {
    extract(raw, schema_for(domain))
}

fn missing_required(
    values: &BTreeMap<&'static str, FieldValue>,
    schema: &DomainSchema,
) -> Vec<String> {
    schema
        .required_keys()
        .filter(|key| !values.contains_key(key))
        .map(str::to_string)
        .collect()
}

// ═══════════════════════════════════════════
// JSON phase
// ═══════════════════════════════════════════

/// `None` when the text holds no JSON object at all; `Err` lists the
/// required fields the object lacks.
fn extract_json(
    text: &str,
    schema: &DomainSchema,
) -> Option<Result<BTreeMap<&'static str, FieldValue>, Vec<String>>> {
    let cleaned = strip_code_fences(text);
    let object = find_json_object(&cleaned)?;

    let mut values = BTreeMap::new();
    for field in schema.fields {
        if let Some(value) = lookup_key(&object, field.key).and_then(|v| coerce_json(v, field)) {
            values.insert(field.key, value);
        }
    }

    let missing = missing_required(&values, schema);
    Some(if missing.is_empty() {
        Ok(values)
    } else {
        Err(missing)
    })
}

/// Remove markdown code fence markers, keeping their contents.
pub fn strip_code_fences(text: &str) -> String {
    static FENCE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"```[A-Za-z]*").expect("valid fence regex"));
    FENCE.replace_all(text, "").into_owned()
}

/// First balanced `{...}` span that parses as a JSON object.
pub fn find_json_object(text: &str) -> Option<Map<String, Value>> {
    text.match_indices('{')
        .take(MAX_JSON_CANDIDATES)
        .find_map(|(start, _)| {
            let end = balanced_end(text, start)?;
            match serde_json::from_str::<Value>(&text[start..end]) {
                Ok(Value::Object(map)) => Some(map),
                _ => None,
            }
        })
}

/// Byte offset just past the brace closing the one at `start`. Braces
/// inside string literals are ignored.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start + i + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Case- and separator-insensitive key lookup, descending one level into
/// nested objects (e.g. `"macros": {"protein": 30}`).
fn lookup_key<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    let wanted = normalize_key(key);
    let direct = object
        .iter()
        .find(|(k, _)| normalize_key(k) == wanted)
        .map(|(_, v)| v);
    direct.or_else(|| {
        object.values().find_map(|v| match v {
            Value::Object(nested) => nested
                .iter()
                .find(|(k, _)| normalize_key(k) == wanted)
                .map(|(_, v)| v),
            _ => None,
        })
    })
}

fn coerce_json(value: &Value, field: &FieldSpec) -> Option<FieldValue> {
    match field.kind {
        FieldKind::Text => match value {
            Value::String(s) => non_blank(s).map(FieldValue::Text),
            Value::Number(n) => Some(FieldValue::Text(n.to_string())),
            Value::Array(items) => {
                let parts = json_list(items);
                (!parts.is_empty()).then(|| FieldValue::Text(parts.join("; ")))
            }
            _ => None,
        },
        FieldKind::List => {
            let items = match value {
                Value::Array(items) => json_list(items),
                Value::String(s) => split_list(s),
                _ => Vec::new(),
            };
            (!items.is_empty()).then_some(FieldValue::List(items))
        }
        FieldKind::Severity => match value {
            Value::String(s) => parse_severity(s, field.key).map(FieldValue::Severity),
            _ => None,
        },
        FieldKind::Number => match value {
            Value::Number(n) => n.as_f64().map(FieldValue::Number),
            Value::String(s) => leading_number(s).map(FieldValue::Number),
            _ => None,
        },
    }
}

fn json_list(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => clean_list_item(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect()
}

// ═══════════════════════════════════════════
// Heading phase
// ═══════════════════════════════════════════

static HEADING_PATTERNS: LazyLock<HashMap<GuidanceDomain, Regex>> = LazyLock::new(|| {
    GuidanceDomain::ALL
        .iter()
        .map(|domain| (*domain, heading_pattern(schema_for(*domain))))
        .collect()
});

/// Line-start heading matcher for every label in the schema. Tolerates
/// markdown `#`, numbering and bold markers; the label is followed by a
/// colon or the end of the line. Longer labels are tried first. The
/// `number` group is checked by `extract_headings`.
fn heading_pattern(schema: &DomainSchema) -> Regex {
    let mut labels: Vec<&str> = schema
        .fields
        .iter()
        .flat_map(|f| f.headings.iter().copied())
        .collect();
    labels.sort_by_key(|label| std::cmp::Reverse(label.len()));

    let alternation = labels
        .iter()
        .map(|label| regex::escape(label).replace(' ', r"[ \t]+"))
        .collect::<Vec<_>>()
        .join("|");

    let pattern = format!(
        r"(?im)^[ \t]*(?:#{{1,6}}[ \t]*)?(?P<number>\d{{1,2}}[.)][ \t]*)?(?:\*\*|__)?[ \t]*(?P<label>{alternation})[ \t]*(?:\*\*|__)?[ \t]*(?::[ \t]*(?:\*\*|__)?|$)"
    );
    Regex::new(&pattern).expect("heading pattern built from escaped labels")
}

fn field_for_label<'s>(schema: &'s DomainSchema, label: &str) -> Option<&'s FieldSpec> {
    let label = label.split_whitespace().collect::<Vec<_>>().join(" ");
    schema
        .fields
        .iter()
        .find(|f| f.headings.iter().any(|h| h.eq_ignore_ascii_case(&label)))
}

fn extract_headings(text: &str, schema: &DomainSchema) -> BTreeMap<&'static str, FieldValue> {
    let mut values = BTreeMap::new();
    let Some(pattern) = HEADING_PATTERNS.get(&schema.domain) else {
        return values;
    };

    let marks: Vec<(usize, usize, &FieldSpec)> = pattern
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            // "1. Diet: less sugar" is a list item, "1. Diet Plan:" a heading
            if caps.name("number").is_some() && !rest_of_line(text, whole.end()).is_empty() {
                return None;
            }
            let field = field_for_label(schema, caps.name("label")?.as_str())?;
            Some((whole.start(), whole.end(), field))
        })
        .collect();

    for (i, (_, body_start, field)) in marks.iter().enumerate() {
        if values.contains_key(field.key) {
            continue;
        }
        let body_end = marks.get(i + 1).map_or(text.len(), |next| next.0);
        if let Some(value) = coerce_block(&text[*body_start..body_end], field) {
            values.insert(field.key, value);
        }
    }
    values
}

fn rest_of_line(text: &str, from: usize) -> &str {
    let rest = &text[from..];
    rest[..rest.find('\n').unwrap_or(rest.len())].trim()
}

fn coerce_block(block: &str, field: &FieldSpec) -> Option<FieldValue> {
    match field.kind {
        FieldKind::Text => non_blank(block).map(FieldValue::Text),
        FieldKind::List => {
            let items = split_list(block);
            (!items.is_empty()).then_some(FieldValue::List(items))
        }
        FieldKind::Severity => {
            let first_word = block
                .split(|c: char| !c.is_ascii_alphabetic())
                .find(|w| !w.is_empty())?;
            parse_severity(first_word, field.key).map(FieldValue::Severity)
        }
        FieldKind::Number => leading_number(block).map(FieldValue::Number),
    }
}

// ═══════════════════════════════════════════
// Value helpers
// ═══════════════════════════════════════════

fn non_blank(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Exact tier name only; anything else is reported and treated as absent.
fn parse_severity(text: &str, key: &str) -> Option<Severity> {
    match text.trim().parse::<Severity>() {
        Ok(severity) => Some(severity),
        Err(_) => {
            tracing::debug!(field = key, "Severity value is not a recognized tier");
            None
        }
    }
}

/// First number in the text, ignoring thousands separators.
fn leading_number(text: &str) -> Option<f64> {
    static NUMBER: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\d[\d,]*(?:\.\d+)?").expect("valid number regex"));
    NUMBER
        .find(text)
        .and_then(|m| m.as_str().replace(',', "").parse().ok())
}

/// Strip one leading bullet (`-`, `•`, `*`) or number marker (`1.`, `2)`).
/// Returns `None` for lines with no alphanumeric content.
pub fn clean_list_item(line: &str) -> Option<String> {
    static NUMBERED: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^\d{1,3}[.)]\s+").expect("valid numbered-item regex"));

    let trimmed = line.trim();
    let item = if let Some(rest) = trimmed
        .strip_prefix('-')
        .or_else(|| trimmed.strip_prefix('•'))
        .or_else(|| {
            // "**Bold**" is emphasis, not a bullet
            if trimmed.starts_with("**") {
                None
            } else {
                trimmed.strip_prefix('*')
            }
        }) {
        rest
    } else if let Some(m) = NUMBERED.find(trimmed) {
        &trimmed[m.end()..]
    } else {
        trimmed
    };

    let item = item.trim();
    item.chars()
        .any(char::is_alphanumeric)
        .then(|| item.to_string())
}

/// One cleaned item per non-empty line.
pub fn split_list(block: &str) -> Vec<String> {
    block.lines().filter_map(clean_list_item).collect()
}
