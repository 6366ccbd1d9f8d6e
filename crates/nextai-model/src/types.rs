// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;

use serde_json::Value;

pub use nextai_config::AgentInputMessage;

/// A tool definition carried to the provider (spec §4.B): the Runner is
/// opaque to tool semantics, it just forwards `{name, description,
/// parameters}` as the provider's function-calling schema.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// One tool call requested by the provider.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// The request passed to [`crate::Runner::generate_turn`] /
/// `generate_turn_stream`.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub messages: Vec<AgentInputMessage>,
}

/// The result of one Runner call (spec §4.B): either plain text, or one or
/// more tool calls the agent turn engine must dispatch before calling the
/// Runner again.
#[derive(Debug, Clone, Default)]
pub struct TurnResult {
    pub text: String,
    pub tool_calls: Vec<ToolCallRequest>,
    /// The assistant's raw text content as returned by the provider, prior
    /// to any trimming the agent turn engine applies (§4.E step 5).
    pub raw_assistant_text: String,
}

/// Sentinel `provider_id` meaning "use the built-in echo demo adapter"
/// (§4.E step 5: "if no active provider, use the built-in demo adapter").
pub const DEMO_PROVIDER_ID: &str = "";

/// Generation configuration resolved by the agent turn engine from the
/// active provider setting (spec §4.B `config`).
#[derive(Debug, Clone, Default)]
pub struct RunnerConfig {
    pub provider_id: String,
    pub model: String,
    pub api_key: String,
    pub base_url: String,
    /// Selects which concrete adapter speaks for this provider. The only
    /// adapter carried by this crate is `"openai_compat"`; any other value
    /// (or an empty `provider_id`) selects the demo adapter.
    pub adapter_id: String,
    pub headers: HashMap<String, String>,
    pub timeout_ms: u64,
}

impl RunnerConfig {
    pub fn is_demo(&self) -> bool {
        self.provider_id == DEMO_PROVIDER_ID
    }

    pub fn demo() -> Self {
        Self::default()
    }
}
