// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The event alphabet emitted by one agent turn (spec §4.E).
//!
//! Order matters: `step_started` precedes any `tool_call` for that step,
//! each `tool_call` precedes its matching `tool_result`, `assistant_delta`
//! events are contiguous, and `completed` (or `error`) is the last event
//! for the turn. Step numbers are monotonically increasing and contiguous
//! from 1. Non-stream callers get the full `Vec<AgentEvent>`; streaming
//! callers get each event as it is produced, framed as SSE and terminated
//! by the literal `[DONE]`.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct ToolCallPayload {
    pub name: String,
    pub input: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolResultPayload {
    pub name: String,
    pub ok: bool,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorMeta {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    StepStarted { step: u32 },
    ToolCall { step: u32, tool_call: ToolCallPayload },
    ToolResult { step: u32, tool_result: ToolResultPayload },
    AssistantDelta { step: u32, delta: String },
    Completed { step: u32, reply: String },
    Error { step: u32, meta: ErrorMeta },
}

impl AgentEvent {
    pub fn step(&self) -> u32 {
        match self {
            AgentEvent::StepStarted { step }
            | AgentEvent::ToolCall { step, .. }
            | AgentEvent::ToolResult { step, .. }
            | AgentEvent::AssistantDelta { step, .. }
            | AgentEvent::Completed { step, .. }
            | AgentEvent::Error { step, .. } => *step,
        }
    }

    pub fn is_tool_call(&self) -> bool {
        matches!(self, AgentEvent::ToolCall { .. })
    }

    pub fn is_assistant_delta(&self) -> bool {
        matches!(self, AgentEvent::AssistantDelta { .. })
    }

    /// The literal SSE frame for this event: `data: <json>\n\n`.
    pub fn to_sse_frame(&self) -> String {
        format!("data: {}\n\n", serde_json::to_string(self).unwrap_or_default())
    }
}

/// The terminal SSE marker (spec §4.E, §6): the literal bytes
/// `data: [DONE]\n\n`, sent after the last real event.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_started_serializes_with_type_tag() {
        let e = AgentEvent::StepStarted { step: 1 };
        let v: Value = serde_json::from_str(&serde_json::to_string(&e).unwrap()).unwrap();
        assert_eq!(v["type"], "step_started");
        assert_eq!(v["step"], 1);
    }

    #[test]
    fn tool_call_nests_name_and_input() {
        let e = AgentEvent::ToolCall {
            step: 2,
            tool_call: ToolCallPayload {
                name: "shell".into(),
                input: serde_json::json!({"command": "ls"}),
            },
        };
        let v: Value = serde_json::from_str(&serde_json::to_string(&e).unwrap()).unwrap();
        assert_eq!(v["type"], "tool_call");
        assert_eq!(v["tool_call"]["name"], "shell");
    }

    #[test]
    fn sse_frame_is_data_prefixed_and_double_newline_terminated() {
        let e = AgentEvent::Completed { step: 1, reply: "hi".into() };
        let frame = e.to_sse_frame();
        assert!(frame.starts_with("data: "));
        assert!(frame.ends_with("\n\n"));
    }

    #[test]
    fn done_frame_is_the_literal_sentinel() {
        assert_eq!(DONE_FRAME, "data: [DONE]\n\n");
    }
}
