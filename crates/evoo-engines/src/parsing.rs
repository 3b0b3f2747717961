//! Pure parsing helpers for LLM output.
//!
//! LLM responses are treated as untrusted text: both functions recover
//! what they can and signal "nothing usable" with empty values instead
//! of errors.

use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn action_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)ACTION:\s*(\w+)\((.*?)\)").expect("action regex is valid")
    })
}

fn param_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(\w+)\s*=\s*["']?([^"',)]+)["']?"#).expect("param regex is valid")
    })
}

fn fenced_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*\n?(.*?)\n?```").expect("fence regex is valid")
    })
}

fn object_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("object regex is valid"))
}

/// Extract `ACTION: tool_name(key=value, ...)` from a response.
///
/// Values are coerced int first, then float, then string. A tool
/// invoked without parentheses content yields an empty parameter map;
/// a response with no ACTION line yields the tool name `"none"`.
pub fn parse_action(response: &str) -> (String, BTreeMap<String, Value>) {
    let captures = match action_re().captures(response) {
        Some(captures) => captures,
        None => return ("none".to_string(), BTreeMap::new()),
    };

    let tool_name = captures[1].to_string();
    let params_str = captures[2].trim().to_string();

    let mut params = BTreeMap::new();
    for capture in param_re().captures_iter(&params_str) {
        let key = capture[1].to_string();
        let raw = capture[2].trim();
        params.insert(key, coerce_value(raw));
    }

    (tool_name, params)
}

/// Extract the free-text THOUGHT section preceding the ACTION line.
pub fn parse_thought(response: &str) -> Option<String> {
    let start = response.find("THOUGHT:")? + "THOUGHT:".len();
    let rest = &response[start..];
    let end = rest.find("ACTION:").unwrap_or(rest.len());
    let thought = rest[..end].trim();
    if thought.is_empty() {
        None
    } else {
        Some(thought.to_string())
    }
}

/// Extract a JSON object from a response, tolerating fenced code
/// blocks and leading prose. Returns an empty map when no valid object
/// is recoverable.
pub fn parse_json(response: &str) -> Map<String, Value> {
    let mut text = response.trim().to_string();

    if let Some(captures) = fenced_re().captures(&text) {
        text = captures[1].trim().to_string();
    }

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&text) {
        return map;
    }

    if let Some(found) = object_re().find(&text) {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(found.as_str()) {
            return map;
        }
    }

    let preview: String = text.chars().take(200).collect();
    log::warn!("llm.json_unparseable preview={:?}", preview);
    Map::new()
}

fn coerce_value(raw: &str) -> Value {
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        if let Some(number) = serde_json::Number::from_f64(f) {
            return Value::Number(number);
        }
    }
    Value::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_action_with_params() {
        let response = "THOUGHT: Scale out to handle the load.\nACTION: scale_horizontal(target_instances=4, service_name=api-service)";
        let (tool, params) = parse_action(response);
        assert_eq!(tool, "scale_horizontal");
        assert_eq!(params["target_instances"], Value::from(4));
        assert_eq!(params["service_name"], Value::from("api-service"));
    }

    #[test]
    fn test_parse_action_coercion_order() {
        let (_, params) = parse_action("ACTION: scale_vertical(target_cpu=4.5, label=big)");
        assert_eq!(params["target_cpu"], Value::from(4.5));
        assert_eq!(params["label"], Value::from("big"));
    }

    #[test]
    fn test_parse_action_finish_and_missing() {
        let (tool, params) = parse_action("ACTION: finish()");
        assert_eq!(tool, "finish");
        assert!(params.is_empty());

        let (tool, _) = parse_action("I think we should wait.");
        assert_eq!(tool, "none");
    }

    #[test]
    fn test_parse_thought() {
        let response = "THOUGHT: Logs show OOM.\nACTION: restart_service()";
        assert_eq!(parse_thought(response).as_deref(), Some("Logs show OOM."));
        assert!(parse_thought("ACTION: finish()").is_none());
    }

    #[test]
    fn test_parse_json_plain() {
        let map = parse_json(r#"{"strategy": "restart_service", "confidence": 0.9}"#);
        assert_eq!(map["strategy"], Value::from("restart_service"));
    }

    #[test]
    fn test_parse_json_fenced_with_prose() {
        let response = "Here is my selection:\n```json\n{\"strategy\": \"clear_cache\"}\n```\nGood luck!";
        let map = parse_json(response);
        assert_eq!(map["strategy"], Value::from("clear_cache"));
    }

    #[test]
    fn test_parse_json_embedded_object() {
        let map = parse_json("The answer is {\"verdict\": \"good\"} as requested.");
        assert_eq!(map["verdict"], Value::from("good"));
    }

    #[test]
    fn test_parse_json_unrecoverable() {
        assert!(parse_json("no json here").is_empty());
        assert!(parse_json("{broken: json").is_empty());
    }
}
