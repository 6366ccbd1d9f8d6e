// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Tool-call JSON repair.
//!
//! Ported near-verbatim from the teacher's `PendingToolCall::finish` /
//! `attempt_json_repair` / `fix_invalid_json_escapes` — models occasionally
//! emit tool-call arguments with invalid escape sequences, missing commas,
//! or truncated strings. This gives the Runner a chance to recover before
//! surfacing `RunnerError::InvalidToolCall` to the agent turn engine.

use serde_json::Value;

/// Parses `args_buf` as JSON, attempting repair on failure. Empty input
/// resolves to `{}` (providers require tool-call input to be an object).
pub fn parse_tool_arguments(args_buf: &str) -> anyhow::Result<Value> {
    if args_buf.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    match serde_json::from_str(args_buf) {
        Ok(v) => Ok(v),
        Err(parse_err) => attempt_json_repair(args_buf)
            .map_err(|_| anyhow::anyhow!("invalid JSON arguments: {parse_err}")),
    }
}

/// Attempts to repair common JSON syntax errors:
/// - invalid escape sequences inside string values (e.g. `\c`, `\p`)
/// - missing commas between key-value pairs
/// - truncated strings/objects
fn attempt_json_repair(json_str: &str) -> anyhow::Result<Value> {
    let fixed = fix_invalid_json_escapes(json_str);
    if let Ok(v) = serde_json::from_str::<Value>(&fixed) {
        return Ok(v);
    }

    let repaired = regex::Regex::new(r#""([^"]+)"([a-zA-Z_][a-zA-Z0-9_]*)":\s*"#)
        .unwrap()
        .replace_all(&fixed, r#""$1", "$2": "#);
    if let Ok(v) = serde_json::from_str::<Value>(&repaired) {
        return Ok(v);
    }

    if !fixed.trim().ends_with('}') {
        let mut completed = fixed.clone();
        let quote_count = fixed.chars().filter(|&c| c == '"').count();
        if quote_count % 2 == 1 {
            completed.push('"');
        }
        if !completed.trim().ends_with('}') {
            completed.push('}');
        }
        if let Ok(v) = serde_json::from_str::<Value>(&completed) {
            return Ok(v);
        }
    }

    anyhow::bail!("JSON repair failed: all repair strategies exhausted")
}

/// Walks `json_str` and replaces invalid escape sequences inside string
/// values with a properly escaped backslash so the result round-trips
/// through `serde_json`.
fn fix_invalid_json_escapes(json_str: &str) -> String {
    let mut result = String::with_capacity(json_str.len() + 16);
    let mut chars = json_str.chars();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            match c {
                '\\' => match chars.next() {
                    Some(next)
                        if matches!(next, '"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u') =>
                    {
                        result.push('\\');
                        result.push(next);
                    }
                    Some(next) => {
                        result.push('\\');
                        result.push('\\');
                        result.push(next);
                    }
                    None => result.push('\\'),
                },
                '"' => {
                    in_string = false;
                    result.push('"');
                }
                _ => result.push(c),
            }
        } else {
            if c == '"' {
                in_string = true;
            }
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_arguments_resolve_to_empty_object() {
        assert_eq!(parse_tool_arguments("").unwrap(), serde_json::json!({}));
        assert_eq!(parse_tool_arguments("   ").unwrap(), serde_json::json!({}));
    }

    #[test]
    fn valid_json_parses_unchanged() {
        let v = parse_tool_arguments(r#"{"a":1}"#).unwrap();
        assert_eq!(v, serde_json::json!({"a": 1}));
    }

    #[test]
    fn invalid_escape_sequence_is_repaired() {
        let broken = r#"{"path":"C:\code\file.txt"}"#;
        let v = parse_tool_arguments(broken).unwrap();
        assert_eq!(v["path"], serde_json::json!("C:\\code\\file.txt"));
    }

    #[test]
    fn truncated_object_is_repaired() {
        let broken = r#"{"command":"echo hi"#;
        let v = parse_tool_arguments(broken).unwrap();
        assert_eq!(v["command"], serde_json::json!("echo hi"));
    }

    #[test]
    fn unrepairable_garbage_returns_error() {
        assert!(parse_tool_arguments("not json at all {{{").is_err());
    }
}
