// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Request shape and the explicit-tool-call shortcut syntax (spec §4.E
//! steps 1 and 3).

use nextai_config::AgentInputMessage;
use serde_json::Value;

use crate::error::EngineError;

/// The request driving one agent turn.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub input: Vec<AgentInputMessage>,
    pub session_id: String,
    pub user_id: String,
    pub channel: String,
    pub stream: bool,
    /// `biz_params` from the request body (spec §3, §4.E step 3).
    pub biz_params: Value,
    /// The full raw request body, used only to look up the top-level
    /// tool-shortcut keys (`view`/`edit`/`shell`/`browser`/`search`) — kept
    /// separate from `biz_params` because those shortcuts live at the
    /// request root, not nested under `biz_params` (spec §4.E step 3).
    pub raw_body: Value,
}

const SHORTCUT_KEYS: [&str; 5] = ["view", "edit", "shell", "browser", "search"];

/// Normalizes a tool name through the spec's fixed alias table (§4.E step 3).
pub fn normalize_tool_name(name: &str) -> String {
    match name {
        "view_file_lines" => "view".to_string(),
        "edit_file_lines" => "edit".to_string(),
        "web_browser" => "browser".to_string(),
        "web_search" => "search".to_string(),
        other => other.to_string(),
    }
}

/// Coerces a tool-call payload: arrays become `{items: [...]}`, objects pass
/// through unchanged, anything else (missing, scalar) becomes `{}` (spec
/// §4.E step 3: "coerced to `{items:[…]}` if it is an array, otherwise
/// passed as the object itself").
fn coerce_payload(v: Value) -> Value {
    match v {
        Value::Array(items) => serde_json::json!({ "items": items }),
        Value::Object(_) => v,
        Value::Null => serde_json::json!({}),
        other => serde_json::json!({ "value": other }),
    }
}

/// One explicit tool call detected in the request (spec §4.E step 3): a
/// normalized tool name and its (already coerced) input payload.
pub struct ExplicitToolCall {
    pub name: String,
    pub input: Value,
}

/// Detects an explicit tool call, preferring `biz_params.tool` over the
/// top-level shortcut keys (spec §4.E step 3).
pub fn detect_explicit_tool_call(req: &AgentRequest) -> Result<Option<ExplicitToolCall>, EngineError> {
    if let Some(tool) = req.biz_params.get("tool") {
        let obj = tool
            .as_object()
            .ok_or_else(|| EngineError::InvalidRequest("biz_params.tool must be an object".into()))?;
        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::InvalidRequest("biz_params.tool.name is required".into()))?;
        let raw_input = if let Some(input) = obj.get("input") {
            input.clone()
        } else {
            let mut rest = obj.clone();
            rest.remove("name");
            Value::Object(rest)
        };
        return Ok(Some(ExplicitToolCall {
            name: normalize_tool_name(name),
            input: coerce_payload(raw_input),
        }));
    }

    let present: Vec<&str> = SHORTCUT_KEYS
        .iter()
        .copied()
        .filter(|k| req.raw_body.get(k).is_some())
        .collect();

    match present.as_slice() {
        [] => Ok(None),
        [key] => Ok(Some(ExplicitToolCall {
            name: normalize_tool_name(key),
            input: coerce_payload(req.raw_body.get(*key).cloned().unwrap_or(Value::Null)),
        })),
        _ => Err(EngineError::InvalidRequest(
            "at most one top-level tool shortcut key may be set".into(),
        )),
    }
}

/// The in-band context-reset command (spec §4.E step 1, §GLOSSARY).
pub const CONTEXT_RESET_COMMAND: &str = "/new";
pub const CONTEXT_RESET_REPLY: &str = "上下文已清理，已开始新会话。";

/// Whether any user message in `input` is exactly the (trimmed,
/// case-insensitive) context-reset command.
pub fn is_context_reset(input: &[AgentInputMessage]) -> bool {
    input.iter().any(|m| {
        m.role == nextai_config::Role::User
            && m.text_content().trim().eq_ignore_ascii_case(CONTEXT_RESET_COMMAND)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn req_with(biz: Value, raw: Value) -> AgentRequest {
        AgentRequest {
            input: vec![],
            session_id: "s".into(),
            user_id: "u".into(),
            channel: "console".into(),
            stream: false,
            biz_params: biz,
            raw_body: raw,
        }
    }

    #[test]
    fn biz_params_tool_takes_precedence_over_shortcuts() {
        let req = req_with(
            json!({"tool": {"name": "shell", "input": {"command": "ls"}}}),
            json!({"view": {"path": "a.txt"}}),
        );
        let call = detect_explicit_tool_call(&req).unwrap().unwrap();
        assert_eq!(call.name, "shell");
        assert_eq!(call.input, json!({"command": "ls"}));
    }

    #[test]
    fn alias_names_are_normalized() {
        let req = req_with(json!({"tool": {"name": "web_search", "query": "rust"}}), json!({}));
        let call = detect_explicit_tool_call(&req).unwrap().unwrap();
        assert_eq!(call.name, "search");
        assert_eq!(call.input, json!({"query": "rust"}));
    }

    #[test]
    fn missing_tool_name_is_invalid() {
        let req = req_with(json!({"tool": {"input": {}}}), json!({}));
        assert!(detect_explicit_tool_call(&req).is_err());
    }

    #[test]
    fn single_shortcut_key_is_accepted() {
        let req = req_with(json!({}), json!({"shell": {"command": "pwd"}}));
        let call = detect_explicit_tool_call(&req).unwrap().unwrap();
        assert_eq!(call.name, "shell");
        assert_eq!(call.input, json!({"command": "pwd"}));
    }

    #[test]
    fn multiple_shortcut_keys_are_invalid() {
        let req = req_with(json!({}), json!({"shell": {}, "view": {}}));
        assert!(detect_explicit_tool_call(&req).is_err());
    }

    #[test]
    fn array_payload_is_coerced_to_items() {
        let req = req_with(json!({"tool": {"name": "shell", "input": [1, 2]}}), json!({}));
        let call = detect_explicit_tool_call(&req).unwrap().unwrap();
        assert_eq!(call.input, json!({"items": [1, 2]}));
    }

    #[test]
    fn no_tool_call_present_is_none() {
        let req = req_with(json!({}), json!({}));
        assert!(detect_explicit_tool_call(&req).unwrap().is_none());
    }

    #[test]
    fn context_reset_command_is_case_insensitive_and_trimmed() {
        let msgs = vec![AgentInputMessage::text(nextai_config::Role::User, "  /NEW  ")];
        assert!(is_context_reset(&msgs));
    }

    #[test]
    fn unrelated_text_is_not_context_reset() {
        let msgs = vec![AgentInputMessage::text(nextai_config::Role::User, "/new chat please")];
        assert!(!is_context_reset(&msgs));
    }
}
