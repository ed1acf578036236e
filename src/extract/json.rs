//! JSON recovery from model output.
//!
//! Models wrap the payload in fences, prepend commentary, or emit a
//! broken draft before the real object. Strategies, in order:
//!
//! 1. content of the first fenced code block
//! 2. every `{...}` candidate from a lazy regex scan, last to first
//! 3. balanced-brace scan starting at the first `{`

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:json|JSON)?\s*([\s\S]*?)```").unwrap());

static BRACED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[\s\S]*?\}").unwrap());

/// Recover the JSON object embedded in `text`.
///
/// Returns `None` when no strategy yields a parseable object.
pub fn recover_json(text: &str) -> Option<Map<String, Value>> {
    if text.trim().is_empty() {
        return None;
    }

    if let Some(obj) = from_fenced_block(text) {
        return Some(obj);
    }
    if let Some(obj) = from_braced_candidates(text) {
        return Some(obj);
    }
    let recovered = from_balanced_scan(text);
    if recovered.is_none() {
        tracing::debug!(len = text.len(), "No JSON object recovered");
    }
    recovered
}

/// Recover and deserialize into `T`.
pub fn recover_json_as<T: DeserializeOwned>(text: &str) -> Option<T> {
    let obj = recover_json(text)?;
    serde_json::from_value(Value::Object(obj)).ok()
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(Value::Object(obj)) => Some(obj),
        _ => None,
    }
}

fn from_fenced_block(text: &str) -> Option<Map<String, Value>> {
    let caps = FENCED_BLOCK.captures(text)?;
    parse_object(caps.get(1)?.as_str())
}

fn from_braced_candidates(text: &str) -> Option<Map<String, Value>> {
    let candidates: Vec<&str> = BRACED.find_iter(text).map(|m| m.as_str()).collect();
    candidates.into_iter().rev().find_map(parse_object)
}

/// Walk top-level objects from the first `{`, tracking depth outside of
/// string literals, and return the first one that parses.
fn from_balanced_scan(text: &str) -> Option<Map<String, Value>> {
    let mut search_from = text.find('{')?;

    while search_from < text.len() {
        let start = search_from + text[search_from..].find('{')?;
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        let mut end = None;

        for (offset, c) in text[start..].char_indices() {
            if in_string {
                match c {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match c {
                '"' => in_string = true,
                '{' => depth += 1,
                '}' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        end = Some(start + offset + 1);
                        break;
                    }
                }
                _ => {}
            }
        }

        let end = end?;
        if let Some(obj) = parse_object(&text[start..end]) {
            return Some(obj);
        }
        search_from = end;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_complete_object_wins() {
        let obj = recover_json(r#"noise {"a":1} more noise {"a":2}"#).unwrap();
        assert_eq!(obj["a"], 2);
    }

    #[test]
    fn test_fenced_block_first() {
        let text = "Here you go:\n```json\n{\"love\": {\"bullets\": [\"Painting\"]}}\n```\n{\"a\": 1}";
        let obj = recover_json(text).unwrap();
        assert_eq!(obj["love"]["bullets"][0], "Painting");
    }

    #[test]
    fn test_nested_object_uses_balanced_scan() {
        let text = "Sure! {\"passion\": {\"bullets\": [\"x\"], \"summary\": \"s\"}} Hope that helps.";
        let obj = recover_json(text).unwrap();
        assert_eq!(obj["passion"]["summary"], "s");
    }

    #[test]
    fn test_braces_inside_strings() {
        let text = "Result: {\"summary\": \"use {curly} braces\"} done";
        let obj = recover_json(text).unwrap();
        assert_eq!(obj["summary"], "use {curly} braces");
    }

    #[test]
    fn test_skips_broken_leading_object() {
        let text = "Draft: {not json} Final: {\"ok\": {\"nested\": true}}";
        let obj = recover_json(text).unwrap();
        assert_eq!(obj["ok"]["nested"], true);
    }

    #[test]
    fn test_no_result_is_none() {
        assert!(recover_json("").is_none());
        assert!(recover_json("no braces at all").is_none());
        assert!(recover_json("{ unterminated").is_none());
        assert!(recover_json("[1, 2, 3]").is_none());
    }

    #[test]
    fn test_recover_as_typed() {
        #[derive(serde::Deserialize)]
        struct Payload {
            a: u32,
        }
        let payload: Payload = recover_json_as("text {\"a\": 7}").unwrap();
        assert_eq!(payload.a, 7);
        assert!(recover_json_as::<Payload>("{\"b\": 1}").is_none());
    }
}
