//! Intent extraction from free-form model output
//!
//! The model is asked to append a single `{"action": ...}` object to its
//! conversational reply, sometimes inside a ```json fence. Extraction finds
//! the first such object with a brace-depth walk that understands string
//! literals, so braces inside quoted values never end the match early.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

lazy_static! {
    static ref ACTION_START: Regex = Regex::new(r#"\{\s*"action"\s*:"#).unwrap();
    static ref FENCED_ACTION: Regex =
        Regex::new(r#"```(?:json)?\s*([\s\S]*?"action"[\s\S]*?)```"#).unwrap();
    static ref FENCED_ACTION_FULL: Regex =
        Regex::new(r#"```(?:json)?\s*[\s\S]*?"action"[\s\S]*?```"#).unwrap();
    static ref EMPTY_FENCE: Regex = Regex::new(r"```(?:json)?\s*```").unwrap();
    static ref EXCESS_NEWLINES: Regex = Regex::new(r"\n{3,}").unwrap();
}

/// A structured action request, e.g. `{"action":"TRANSFER","params":{...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub action: String,
    #[serde(default = "empty_params")]
    pub params: Value,
}

fn empty_params() -> Value {
    Value::Object(Map::new())
}

impl Intent {
    pub fn new(action: impl Into<String>, params: Value) -> Self {
        Self {
            action: action.into(),
            params,
        }
    }
}

/// Byte span of a balanced action object within a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionSpan {
    pub start: usize,
    pub end: usize,
}

/// Locate the first balanced `{"action": ...}` object in `text`.
pub fn find_action_block(text: &str) -> Option<ActionSpan> {
    let start = ACTION_START.find(text)?.start();

    let mut depth: usize = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            _ if in_string => {}
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(ActionSpan {
                        start,
                        end: start + offset + 1,
                    });
                }
            }
            _ => {}
        }
    }

    None
}

fn parse_block(text: &str) -> Option<Intent> {
    let span = find_action_block(text)?;
    let raw = &text[span.start..span.end];

    match serde_json::from_str::<Intent>(raw) {
        Ok(mut intent) => {
            if !intent.params.is_object() {
                intent.params = empty_params();
            }
            Some(intent)
        }
        Err(e) => {
            debug!(error = %e, "Discarding malformed action block");
            None
        }
    }
}

/// Extract at most one intent. Fenced blocks are tried before bare ones;
/// malformed JSON yields `None`.
pub fn extract_intent(text: &str) -> Option<Intent> {
    if let Some(captures) = FENCED_ACTION.captures(text) {
        if let Some(inner) = captures.get(1) {
            if let Some(intent) = parse_block(inner.as_str()) {
                return Some(intent);
            }
        }
    }

    parse_block(text)
}

/// Strip the action object (and any empty fences) leaving conversational prose.
pub fn clean_response(text: &str) -> String {
    let mut cleaned = FENCED_ACTION_FULL.replace_all(text, "").into_owned();

    if let Some(span) = find_action_block(&cleaned) {
        cleaned.replace_range(span.start..span.end, "");
    }

    let cleaned = EMPTY_FENCE.replace_all(&cleaned, "");
    let cleaned = EXCESS_NEWLINES.replace_all(&cleaned, "\n\n");

    cleaned.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extracts_bare_block_with_surrounding_prose() {
        let text = r#"Sure, checking now. {"action": "GET_BALANCE"} Anything else?"#;
        let intent = extract_intent(text).unwrap();
        assert_eq!(intent.action, "GET_BALANCE");
        assert_eq!(intent.params, json!({}));
        assert_eq!(clean_response(text), "Sure, checking now.  Anything else?");
    }

    #[test]
    fn test_extracts_fenced_block() {
        let text = "Let me set that up.\n\n```json\n{\"action\": \"TRANSFER\", \"params\": {\"toAccount\": \"OW10002\", \"amount\": 500}}\n```\n";
        let intent = extract_intent(text).unwrap();
        assert_eq!(intent.action, "TRANSFER");
        assert_eq!(intent.params["amount"], json!(500));
        assert_eq!(clean_response(text), "Let me set that up.");
    }

    #[test]
    fn test_braces_inside_strings_do_not_end_block() {
        let text = r#"{"action": "TRANSFER", "params": {"description": "rent } {\"action\": x", "amount": 10}} tail"#;
        let span = find_action_block(text).unwrap();
        assert!(text[..span.end].ends_with("10}}"));

        let intent = extract_intent(text).unwrap();
        assert_eq!(intent.params["description"], json!("rent } {\"action\": x"));
        assert_eq!(clean_response(text), "tail");
    }

    #[test]
    fn test_only_first_block_consumed() {
        let text = r#"{"action": "GET_BALANCE"} and {"action": "GET_TRANSACTIONS"}"#;
        assert_eq!(extract_intent(text).unwrap().action, "GET_BALANCE");
        assert_eq!(clean_response(text), r#"and {"action": "GET_TRANSACTIONS"}"#);
    }

    #[test]
    fn test_no_block_returns_none_and_text_unchanged() {
        let text = "Hello! How can I help you today?";
        assert!(extract_intent(text).is_none());
        assert_eq!(clean_response(text), text);
    }

    #[test]
    fn test_malformed_json_is_not_an_intent() {
        let text = r#"{"action": "TRANSFER", "params": {"amount": 5,}}"#;
        assert!(extract_intent(text).is_none());
    }

    #[test]
    fn test_unbalanced_block_is_ignored() {
        let text = r#"{"action": "TRANSFER", "params": {"amount": 5}"#;
        assert!(find_action_block(text).is_none());
        assert!(extract_intent(text).is_none());
    }

    #[test]
    fn test_collapses_newline_runs() {
        let text = "Line one.\n\n\n\n{\"action\": \"GET_CREDIT_SCORE\"}\n\n\n\nLine two.";
        assert_eq!(clean_response(text), "Line one.\n\nLine two.");
    }

    #[test]
    fn test_multibyte_prose_before_block() {
        let text = "Great news 🎉 {\"action\": \"LIST_CARDS\"}";
        assert_eq!(extract_intent(text).unwrap().action, "LIST_CARDS");
        assert_eq!(clean_response(text), "Great news 🎉");
    }
}
