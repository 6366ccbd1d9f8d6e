// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Agent Turn Engine error kinds.
//!
//! These are the typed errors the engine can produce or forward from its
//! collaborators (Runner, Tool Registry, Channel Registry, State Store).
//! HTTP status mapping lives in the gateway binary's error mapper (§7) —
//! this crate only exposes a stable `code()` so that mapper has something
//! to switch on without depending on any transport concern.

use nextai_channels::ChannelError;
use nextai_model::RunnerError;
use nextai_store::StoreError;
use nextai_tools::ToolError;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("provider is not configured")]
    ProviderNotConfigured,
    #[error("provider '{0}' is disabled")]
    ProviderDisabled(String),
    #[error("model '{0}' was not found in the provider's catalog")]
    ModelNotFound(String),
    #[error("provider '{0}' is not supported")]
    ProviderNotSupported(String),
    #[error("provider request failed: {0}")]
    ProviderRequestFailed(String),
    #[error("{0}")]
    ProviderInvalidReply(String),

    #[error("tool '{0}' is disabled")]
    ToolDisabled(String),
    #[error("tool '{0}' is not supported")]
    ToolNotSupported(String),
    #[error("tool runtime unavailable: {0}")]
    ToolRuntimeUnavailable(String),
    #[error("tool invocation failed: {0}")]
    ToolInvokeFailed(String),
    #[error("tool produced an invalid result: {0}")]
    ToolInvalidResult(String),
    #[error("{0}")]
    ToolInvalidInput(String),

    #[error("invalid channel name")]
    InvalidChannel,
    #[error("channel '{0}' is not supported")]
    ChannelNotSupported(String),
    #[error("channel '{0}' is disabled")]
    ChannelDisabled(String),
    #[error("channel dispatch failed: {0}")]
    ChannelDispatchFailed(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    StoreError(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// The `{error:{code}}` snake_case identifier (§7).
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::ProviderNotConfigured => "provider_not_configured",
            EngineError::ProviderDisabled(_) => "provider_disabled",
            EngineError::ModelNotFound(_) => "model_not_found",
            EngineError::ProviderNotSupported(_) => "provider_not_supported",
            EngineError::ProviderRequestFailed(_) => "provider_request_failed",
            EngineError::ProviderInvalidReply(_) => "provider_invalid_reply",
            EngineError::ToolDisabled(_) => "tool_disabled",
            EngineError::ToolNotSupported(_) => "tool_not_supported",
            EngineError::ToolRuntimeUnavailable(_) => "tool_runtime_unavailable",
            EngineError::ToolInvokeFailed(_) => "tool_invoke_failed",
            EngineError::ToolInvalidResult(_) => "tool_invalid_result",
            EngineError::ToolInvalidInput(_) => "invalid_tool_input",
            EngineError::InvalidChannel => "invalid_channel",
            EngineError::ChannelNotSupported(_) => "channel_not_supported",
            EngineError::ChannelDisabled(_) => "channel_disabled",
            EngineError::ChannelDispatchFailed(_) => "channel_dispatch_failed",
            EngineError::InvalidRequest(_) => "invalid_request",
            EngineError::StoreError(_) => "store_error",
            EngineError::Internal(_) => "runner_error",
        }
    }

    pub fn details(&self) -> Option<Value> {
        None
    }
}

impl From<RunnerError> for EngineError {
    fn from(e: RunnerError) -> Self {
        match e {
            RunnerError::ProviderNotConfigured => EngineError::ProviderNotConfigured,
            RunnerError::ProviderNotSupported(p) => EngineError::ProviderNotSupported(p),
            RunnerError::ProviderRequestFailed(m) => EngineError::ProviderRequestFailed(m),
            RunnerError::ProviderInvalidReply(m) => EngineError::ProviderInvalidReply(m),
            // InvalidToolCall is handled as an in-loop recovery path by the
            // engine (§4.E step 5) and should never reach this conversion;
            // if it does (a collaborator propagating it directly), treat it
            // as an unclassified runner error rather than panicking.
            RunnerError::InvalidToolCall { name, .. } => {
                EngineError::Internal(format!("unhandled invalid tool call for {name}"))
            }
        }
    }
}

impl From<ToolError> for EngineError {
    fn from(e: ToolError) -> Self {
        match e {
            ToolError::Disabled(n) => EngineError::ToolDisabled(n),
            ToolError::NotSupported(n) => EngineError::ToolNotSupported(n),
            ToolError::InvalidInput(m) => EngineError::ToolInvalidInput(m),
            ToolError::RuntimeUnavailable(m) => EngineError::ToolRuntimeUnavailable(m),
            ToolError::InvokeFailed(err) => EngineError::ToolInvokeFailed(err.to_string()),
            ToolError::InvalidResult(m) => EngineError::ToolInvalidResult(m),
        }
    }
}

impl From<ChannelError> for EngineError {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::InvalidChannel => EngineError::InvalidChannel,
            ChannelError::NotSupported(n) => EngineError::ChannelNotSupported(n),
            ChannelError::Disabled(n) => EngineError::ChannelDisabled(n),
            ChannelError::DispatchFailed(m) => EngineError::ChannelDispatchFailed(m),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::StoreError(e.to_string())
    }
}
