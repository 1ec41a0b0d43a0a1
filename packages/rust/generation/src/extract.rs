//! Response normalization: raw completion text → file content or JSON.

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;

use mvpfactory_shared::{FactoryError, Result};

/// First fenced code block, with an optional language tag.
static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:[\w+\-]*)\n(.*?)```").expect("valid regex"));

/// Outermost `{ ... }` span, used when a JSON reply is wrapped in prose.
static BRACED_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));

/// How a completion's content was recovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedResponse {
    /// Body of the first fenced code block.
    FencedBlock(String),
    /// `code` field of a JSON object reply.
    JsonObject(String),
    /// The trimmed completion itself.
    RawText(String),
}

impl ExtractedResponse {
    pub fn content(&self) -> &str {
        match self {
            Self::FencedBlock(s) | Self::JsonObject(s) | Self::RawText(s) => s,
        }
    }

    pub fn into_content(self) -> String {
        match self {
            Self::FencedBlock(s) | Self::JsonObject(s) | Self::RawText(s) => s,
        }
    }
}

/// Classify a completion, trying a fenced block, then a JSON `code` field,
/// then falling back to the raw text.
pub fn extract_content(raw: &str) -> ExtractedResponse {
    if let Some(caps) = FENCED_BLOCK.captures(raw) {
        return ExtractedResponse::FencedBlock(caps[1].trim().to_string());
    }

    if let Ok(serde_json::Value::Object(obj)) = serde_json::from_str(raw.trim()) {
        if let Some(code) = obj.get("code").and_then(|v| v.as_str()) {
            return ExtractedResponse::JsonObject(code.to_string());
        }
    }

    ExtractedResponse::RawText(raw.trim().to_string())
}

/// Parse a JSON reply into `T`.
///
/// Markdown fences are stripped first; if the remainder is not valid JSON the
/// outermost braced span is tried before giving up.
pub fn parse_json_response<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let unfenced = strip_json_fence(raw);

    let first_err = match serde_json::from_str::<T>(unfenced) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    if let Some(m) = BRACED_OBJECT.find(unfenced) {
        if let Ok(value) = serde_json::from_str::<T>(m.as_str()) {
            return Ok(value);
        }
    }

    Err(FactoryError::parse(format!(
        "response is not valid JSON ({first_err}): {}",
        raw.chars().take(120).collect::<String>()
    )))
}

fn strip_json_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_block_wins() {
        let raw = "Here you go:\n```python\nprint('hi')\n```\nThanks";
        assert_eq!(
            extract_content(raw),
            ExtractedResponse::FencedBlock("print('hi')".into())
        );
    }

    #[test]
    fn fence_without_language_tag() {
        let raw = "```\n<html></html>\n```";
        assert_eq!(extract_content(raw).content(), "<html></html>");
    }

    #[test]
    fn json_code_field_is_second_choice() {
        let raw = r#"{"code": "const x = 1;", "notes": "none"}"#;
        assert_eq!(
            extract_content(raw),
            ExtractedResponse::JsonObject("const x = 1;".into())
        );
    }

    #[test]
    fn raw_text_fallback() {
        let raw = "  body { margin: 0 }  \n";
        assert_eq!(
            extract_content(raw),
            ExtractedResponse::RawText("body { margin: 0 }".into())
        );

        let json_without_code = r#"{"content": "x"}"#;
        assert!(matches!(
            extract_content(json_without_code),
            ExtractedResponse::RawText(_)
        ));
    }

    #[test]
    fn parse_json_strips_fences() {
        let raw = "```json\n{\"project_name\": \"todo\"}\n```";
        let value: serde_json::Value = parse_json_response(raw).unwrap();
        assert_eq!(value["project_name"], "todo");
    }

    #[test]
    fn parse_json_falls_back_to_braced_span() {
        let raw = "Sure! Here is the plan: {\"issues\": [], \"fixed_files\": {}} Hope it helps.";
        let value: serde_json::Value = parse_json_response(raw).unwrap();
        assert!(value["issues"].as_array().unwrap().is_empty());
    }

    #[test]
    fn parse_json_reports_garbage() {
        let err = parse_json_response::<serde_json::Value>("no json here").unwrap_err();
        assert!(err.to_string().starts_with("parse error"));
    }
}
