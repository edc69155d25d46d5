//! Pulling a JSON payload out of free text and decoding it.
//!
//! The delimiter scan counts nesting depth only; it does not know about
//! string literals. A reply that mentions `{` or `[` in prose before the real
//! payload will be cut at the wrong place and fail to decode.

use std::collections::{HashMap, HashSet};

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::StructuredError;

/// Locate the JSON payload inside an oracle reply.
///
/// Returns the reply itself when it already starts with `{` or `[`,
/// otherwise the span from the first opening delimiter to its balanced
/// close (or to the end of the reply if it never balances).
pub fn extract_json_payload(reply: &str) -> Option<&str> {
    let trimmed = reply.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Some(trimmed);
    }

    let start = trimmed.find(|c: char| c == '{' || c == '[')?;
    let rest = &trimmed[start..];
    let (open, close) = if rest.starts_with('{') {
        ('{', '}')
    } else {
        ('[', ']')
    };

    let mut depth = 0usize;
    for (offset, ch) in rest.char_indices() {
        if ch == open {
            depth += 1;
        } else if ch == close {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return Some(&rest[..offset + ch.len_utf8()]);
            }
        }
    }

    Some(rest)
}

/// Escape raw CR, LF and TAB characters that appear inside string literals.
///
/// Tracks whether the cursor is inside a quoted string, honoring backslash
/// escapes. Characters outside strings are left untouched.
pub fn repair_string_literals(payload: &str) -> String {
    let mut out = String::with_capacity(payload.len() + 16);
    let mut in_string = false;
    let mut escaped = false;

    for ch in payload.chars() {
        if !in_string {
            if ch == '"' {
                in_string = true;
            }
            out.push(ch);
            continue;
        }

        if escaped {
            escaped = false;
            out.push(ch);
            continue;
        }

        match ch {
            '\\' => {
                escaped = true;
                out.push(ch);
            }
            '"' => {
                in_string = false;
                out.push(ch);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }

    out
}

/// Decode an oracle reply into `T`.
///
/// Extraction, then a case-insensitive decode against the property names in
/// `schema`, then one repair pass if the first decode fails.
pub fn decode<T: DeserializeOwned>(reply: &str, schema: &Value) -> Result<T, StructuredError> {
    let payload = extract_json_payload(reply)
        .ok_or_else(|| StructuredError::parse::<T>("no JSON object or array found", reply))?;

    let names = property_names(schema);

    match decode_payload::<T>(payload, &names) {
        Ok(value) => Ok(value),
        Err(first) => {
            let repaired = repair_string_literals(payload);
            if repaired == payload {
                return Err(StructuredError::parse::<T>(first, reply));
            }
            tracing::debug!("First decode failed ({}), retrying after repair", first);
            decode_payload::<T>(&repaired, &names)
                .map_err(|second| StructuredError::parse::<T>(second, reply))
        }
    }
}

fn decode_payload<T: DeserializeOwned>(
    payload: &str,
    names: &HashMap<String, String>,
) -> Result<T, String> {
    let value: Value = serde_json::from_str(payload).map_err(|e| e.to_string())?;
    serde_json::from_value(normalize_keys(value, names)).map_err(|e| e.to_string())
}

/// Lowercased property name -> declared property name, for every object in the schema.
fn property_names(schema: &Value) -> HashMap<String, String> {
    let mut names = HashSet::new();
    collect_property_names(schema, &mut names);
    names
        .into_iter()
        .map(|name| (name.to_lowercase(), name))
        .collect()
}

fn collect_property_names(schema: &Value, out: &mut HashSet<String>) {
    match schema {
        Value::Object(map) => {
            if let Some(Value::Object(properties)) = map.get("properties") {
                out.extend(properties.keys().cloned());
            }
            for child in map.values() {
                collect_property_names(child, out);
            }
        }
        Value::Array(items) => {
            for child in items {
                collect_property_names(child, out);
            }
        }
        _ => {}
    }
}

fn normalize_keys(value: Value, names: &HashMap<String, String>) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, child)| {
                    let key = names.get(&key.to_lowercase()).cloned().unwrap_or(key);
                    (key, normalize_keys(child, names))
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|child| normalize_keys(child, names))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct Content {
        content: String,
        sources: Vec<String>,
    }

    fn schema() -> Value {
        serde_json::to_value(schemars::schema_for!(Content)).unwrap()
    }

    #[test]
    fn test_payload_returned_as_is_when_reply_is_json() {
        assert_eq!(extract_json_payload("  [1, 2]  "), Some("[1, 2]"));
    }

    #[test]
    fn test_payload_found_after_preamble() {
        let reply = r#"Sure, here it is: {"content":"x","sources":[]}"#;
        assert_eq!(
            extract_json_payload(reply),
            Some(r#"{"content":"x","sources":[]}"#)
        );
        let decoded: Content = decode(reply, &schema()).unwrap();
        assert_eq!(
            decoded,
            Content {
                content: "x".to_string(),
                sources: vec![]
            }
        );
    }

    #[test]
    fn test_payload_trailing_prose_is_cut() {
        let reply = "Result:\n```json\n{\"a\": {\"b\": 1}}\n```\nHope this helps!";
        assert_eq!(extract_json_payload(reply), Some("{\"a\": {\"b\": 1}}"));
    }

    #[test]
    fn test_no_payload() {
        assert_eq!(extract_json_payload("no json here"), None);
        let err = decode::<Content>("no json here", &schema()).unwrap_err();
        assert_eq!(err.raw_reply(), Some("no json here"));
    }

    #[test]
    fn test_prose_brace_defeats_scan() {
        // Known limitation: the scan is not string-literal aware.
        let reply = r#"Use {braces} carefully. {"content":"x","sources":[]}"#;
        assert_eq!(extract_json_payload(reply), Some("{braces}"));
        assert!(decode::<Content>(reply, &schema()).is_err());
    }

    #[test]
    fn test_repair_escapes_control_chars_inside_strings_only() {
        let payload = "{\n\"content\": \"line one\nline\ttwo\",\n\"sources\": []\n}";
        let repaired = repair_string_literals(payload);
        assert_eq!(
            repaired,
            "{\n\"content\": \"line one\\nline\\ttwo\",\n\"sources\": []\n}"
        );
    }

    #[test]
    fn test_repair_respects_escaped_quotes() {
        let payload = "{\"content\": \"say \\\"hi\\\"\nthere\"}";
        let repaired = repair_string_literals(payload);
        assert_eq!(repaired, "{\"content\": \"say \\\"hi\\\"\\nthere\"}");
    }

    #[test]
    fn test_raw_newline_fails_then_repair_succeeds() {
        let reply = "{\"content\":\"line one\nline two\",\"sources\":[\"a\"]}";
        assert!(serde_json::from_str::<Content>(reply).is_err());
        let decoded: Content = decode(reply, &schema()).unwrap();
        assert_eq!(decoded.content, "line one\nline two");
        assert_eq!(decoded.sources, vec!["a".to_string()]);
    }

    #[test]
    fn test_keys_match_case_insensitively() {
        let reply = r#"{"Content":"x","SOURCES":["s"]}"#;
        let decoded: Content = decode(reply, &schema()).unwrap();
        assert_eq!(decoded.content, "x");
        assert_eq!(decoded.sources, vec!["s".to_string()]);
    }

    #[test]
    fn test_schema_violation_reports_raw_reply() {
        let reply = r#"{"content": 5}"#;
        match decode::<Content>(reply, &schema()).unwrap_err() {
            StructuredError::Parse { raw, type_name, .. } => {
                assert_eq!(raw, reply);
                assert!(type_name.contains("Content"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
