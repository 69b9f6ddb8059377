use std::sync::LazyLock;

use regex::Regex;

/// Result of input sanitization (pre-prompt).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedInput {
    pub text: String,
    pub was_modified: bool,
    pub modifications: Vec<InputModification>,
}

/// Types of input sanitization applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputModification {
    InvisibleUnicodeRemoved,
    ControlCharacterRemoved,
    InjectionPatternRemoved,
    ExcessiveLengthTruncated,
}

/// Sanitize user free text before it is embedded in a prompt.
///
/// Infallible: the worst case is an empty string, which the prompt builder
/// renders as "none specified".
pub fn sanitize_user_text(raw: &str, max_chars: usize) -> SanitizedInput {
    let mut text = raw.to_string();
    let mut modifications = Vec::new();

    let before = text.clone();
    text = remove_invisible_unicode(&text);
    if text != before {
        modifications.push(InputModification::InvisibleUnicodeRemoved);
    }

    let before = text.clone();
    text = remove_control_characters(&text);
    if text != before {
        modifications.push(InputModification::ControlCharacterRemoved);
    }

    let before = text.clone();
    text = remove_injection_patterns(&text);
    if text != before {
        modifications.push(InputModification::InjectionPatternRemoved);
    }

    if text.chars().count() > max_chars {
        text = truncate_at_word_boundary(&text, max_chars);
        modifications.push(InputModification::ExcessiveLengthTruncated);
    }

    let text = text.trim().to_string();
    let was_modified = !modifications.is_empty();
    if was_modified {
        tracing::debug!(?modifications, chars = text.chars().count(), "Sanitized user text");
    }

    SanitizedInput {
        text,
        was_modified,
        modifications,
    }
}

/// Remove zero-width and invisible Unicode characters.
fn remove_invisible_unicode(text: &str) -> String {
    text.chars()
        .filter(|c| {
            !matches!(
                *c,
                '\u{200B}'..='\u{200F}'  // Zero-width chars
                | '\u{202A}'..='\u{202E}' // Directional formatting
                | '\u{2060}'..='\u{2064}' // Invisible operators
                | '\u{2066}'..='\u{2069}' // Directional isolates
                | '\u{FEFF}'              // BOM
                | '\u{00AD}'              // Soft hyphen
            )
        })
        .collect()
}

/// Remove control characters except newline and tab.
fn remove_control_characters(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

/// Replace known prompt injection patterns with [FILTERED].
fn remove_injection_patterns(text: &str) -> String {
    static INJECTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
        [
            r"(?i)ignore\s+(?:previous|above|all\s+prior|the\s+above)\s+(?:instructions?|rules?|prompts?)",
            r"(?i)forget\s+(?:everything|all|your)\s+(?:previous|prior)?",
            r"(?i)new\s+instructions?:",
            r"(?i)you\s+are\s+now\s+(?:a|an)\s+",
            r"(?i)system\s*:",
            r"(?i)assistant\s*:",
            r"<<SYS>>",
            r"\[INST\]",
            r"<\|im_start\|>",
            r"<\|im_end\|>",
            r"(?i)respond\s+only\s+with",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("invalid injection pattern"))
        .collect()
    });

    let mut result = text.to_string();
    for pattern in INJECTION_PATTERNS.iter() {
        result = pattern.replace_all(&result, "[FILTERED]").to_string();
    }
    result
}

/// Truncate to at most `max` characters, backing off to the last whitespace.
fn truncate_at_word_boundary(text: &str, max: usize) -> String {
    let cut = text
        .char_indices()
        .nth(max)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let truncated = &text[..cut];
    match truncated.rfind(char::is_whitespace) {
        Some(pos) if pos > 0 => truncated[..pos].to_string(),
        _ => truncated.to_string(),
    }
}
