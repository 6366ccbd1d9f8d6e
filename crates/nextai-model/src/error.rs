// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde_json::Value;

/// Typed Runner error variants (spec §4.B, mapped to HTTP by the gateway's
/// error mapper per §7).
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("provider is not configured")]
    ProviderNotConfigured,
    #[error("provider '{0}' is not supported")]
    ProviderNotSupported(String),
    #[error("provider request failed: {0}")]
    ProviderRequestFailed(String),
    #[error("{0}")]
    ProviderInvalidReply(String),
    /// Recoverable: the provider emitted a tool call whose JSON arguments
    /// could not be parsed (even after repair). The agent turn engine
    /// recovers from this by feeding structured feedback back as a tool
    /// message and retrying (§4.E step 5).
    #[error("invalid tool call arguments for {name}")]
    InvalidToolCall {
        call_id: String,
        name: String,
        arguments_raw: String,
        #[source]
        err: anyhow::Error,
    },
}

impl RunnerError {
    /// The `details` payload carried in the `{error:{code,message,details}}`
    /// envelope, populated only for variants that have structured detail.
    pub fn details(&self) -> Option<Value> {
        match self {
            RunnerError::InvalidToolCall {
                call_id,
                name,
                arguments_raw,
                err,
            } => Some(serde_json::json!({
                "call_id": call_id,
                "name": name,
                "arguments_raw": arguments_raw,
                "cause": err.to_string(),
            })),
            _ => None,
        }
    }
}
