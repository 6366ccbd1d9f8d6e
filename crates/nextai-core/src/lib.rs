// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The Agent Turn Engine crate: the bounded, tool-augmented generation loop
//! that drives one agent turn over a chat's history (spec §4.E).

mod engine;
mod error;
mod events;
mod layers;
mod request;
mod text;

pub use engine::{Engine, EventSink, TurnOutcome, VecSink};
pub use error::EngineError;
pub use events::{AgentEvent, ErrorMeta, ToolCallPayload, ToolResultPayload, DONE_FRAME};
pub use layers::{auto_chat_name, system_layers, system_messages, SystemLayer};
pub use request::{
    detect_explicit_tool_call, is_context_reset, normalize_tool_name, AgentRequest, ExplicitToolCall,
    CONTEXT_RESET_COMMAND, CONTEXT_RESET_REPLY,
};
pub use text::{chunk_runes, compact_feedback, first_runes, truncate_preview};
