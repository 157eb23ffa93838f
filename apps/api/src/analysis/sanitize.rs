//! Turns untrusted model output into a JSON object.
//!
//! Models wrap JSON in markdown fences and leak control characters into
//! string values despite instructions. `sanitize` undoes both; `parse_analysis`
//! then insists on a single JSON object.

use serde_json::Value;
use thiserror::Error;

const FENCE: &str = "```";

/// Characters of offending output kept for diagnostics.
pub const LOG_PREFIX_CHARS: usize = 500;

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("AI model returned an empty response")]
    Empty,

    #[error("JSON Parse Error: {0}")]
    Malformed(String),
}

/// Removes control characters (everything below 0x20 except `\n`), then
/// markdown fences and surrounding whitespace until none remain.
pub fn sanitize(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c >= ' ' || *c == '\n')
        .collect();

    let mut text = cleaned.trim();
    loop {
        let stripped = strip_fences(text);
        if stripped.len() == text.len() {
            break;
        }
        text = stripped;
    }
    text.to_string()
}

fn strip_fences(text: &str) -> &str {
    let mut text = text;
    if let Some(rest) = text.strip_prefix(FENCE) {
        text = match rest.get(..4) {
            Some(tag) if tag.eq_ignore_ascii_case("json") => &rest[4..],
            _ => rest,
        };
    }
    if let Some(rest) = text.strip_suffix(FENCE) {
        text = rest;
    }
    text.trim()
}

/// Sanitizes and parses model output. Only a JSON object is accepted.
pub fn parse_analysis(raw: &str) -> Result<Value, ParseError> {
    let text = sanitize(raw);
    if text.is_empty() {
        return Err(ParseError::Empty);
    }

    let value: Value =
        serde_json::from_str(&text).map_err(|e| ParseError::Malformed(e.to_string()))?;

    if !value.is_object() {
        return Err(ParseError::Malformed(format!(
            "expected a JSON object, found {}",
            json_kind(&value)
        )));
    }
    Ok(value)
}

/// Bounded prefix of model output for logging. Never store the full payload.
pub fn log_prefix(text: &str) -> String {
    let mut chars = text.chars();
    let prefix: String = chars.by_ref().take(LOG_PREFIX_CHARS).collect();
    if chars.next().is_some() {
        format!("{prefix}...[truncated]")
    } else {
        prefix
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
