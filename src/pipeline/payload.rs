//! Payload extraction: turn a raw model answer into a validated JSON string.
//!
//! Models often wrap JSON in a ```` ```json ```` fence despite being told not
//! to, and sometimes add stray whitespace or a BOM around it. These rules
//! strip that wrapping and then parse the remainder purely to check it is
//! a well-formed JSON object. The text handed on is the unwrapped original, not a
//! re-serialisation, so key order and number formatting survive.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// A payload that parsed as JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidPayload {
    pub text: String,
    pub value: Value,
}

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)\r?\n?```\s*$").unwrap());

/// Remove an outer Markdown code fence (```` ```json ```` … ```` ``` ````),
/// if present, plus surrounding whitespace and a leading BOM.
pub fn strip_code_fence(raw: &str) -> &str {
    let s = raw.trim_start_matches('\u{feff}').trim();
    match RE_OUTER_FENCE.captures(s).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => s,
    }
}

/// Strip fences and validate. The payload must be a JSON object; `Err`
/// carries the parser message or names the top-level type found instead.
pub fn validate(raw: &str) -> Result<ValidPayload, String> {
    let text = strip_code_fence(raw);
    if text.is_empty() {
        return Err("empty payload".to_string());
    }
    let value: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
    if !value.is_object() {
        return Err(format!("expected a JSON object, got {}", json_type(&value)));
    }
    Ok(ValidPayload {
        text: text.to_string(),
        value,
    })
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_json_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("  ```\n[1]\n```  \n"), "[1]");
        assert_eq!(strip_code_fence("```JSON {\"a\":1}```"), "{\"a\":1}");
    }

    #[test]
    fn unfenced_passes_through() {
        assert_eq!(strip_code_fence("\u{feff} {\"a\":1}\n"), "{\"a\":1}");
    }

    #[test]
    fn crlf_fence() {
        assert_eq!(strip_code_fence("```json\r\n{}\r\n```\r\n"), "{}");
    }

    #[test]
    fn validate_keeps_original_text() {
        let p = validate("```json\n{\"b\": 2, \"a\": 1.50}\n```").unwrap();
        assert_eq!(p.text, "{\"b\": 2, \"a\": 1.50}");
        assert_eq!(p.value, json!({"b": 2, "a": 1.5}));
    }

    #[test]
    fn malformed_is_rejected() {
        assert!(validate("Here is the JSON you asked for: {").is_err());
        assert!(validate("```json\n```").is_err());
        assert!(validate("").is_err());
    }

    #[test]
    fn non_object_payloads_are_rejected() {
        for raw in ["null", "42", "\"text\"", "true", "```json\n[1, 2]\n```"] {
            let err = validate(raw).unwrap_err();
            assert!(err.starts_with("expected a JSON object"), "{raw}: {err}");
        }
        assert!(validate("{}").is_ok());
    }
}
