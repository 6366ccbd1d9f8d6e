// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;

use crate::error::RunnerError;
use crate::types::{GenerationRequest, RunnerConfig, ToolDefinition, TurnResult};

/// Sink for incremental assistant text during a streaming turn (spec §4.B,
/// §9 "Runner streaming callback is a small sink interface rather than a
/// channel/future because order and flush semantics are contractual").
///
/// Implementations MUST be invoked in arrival order from a single
/// logical producer; the agent turn engine forwards each call verbatim as
/// an `assistant_delta` event before the next one is requested.
#[async_trait]
pub trait DeltaSink: Send {
    async fn on_delta(&mut self, delta: &str);
}

/// A sink that does nothing — used when a caller wants [`Runner::generate_turn`]
/// semantics but must go through the streaming entry point.
pub struct NullSink;

#[async_trait]
impl DeltaSink for NullSink {
    async fn on_delta(&mut self, _delta: &str) {}
}

/// The boundary exposed to the agent turn engine (spec §4.B).
///
/// `config.is_demo()` selects the built-in echo adapter regardless of the
/// concrete `Runner` implementation backing this trait object — the demo
/// adapter is a first-class code path, not a mock; see [`crate::demo`].
#[async_trait]
pub trait Runner: Send + Sync {
    async fn generate_turn(
        &self,
        req: &GenerationRequest,
        config: &RunnerConfig,
        tools: &[ToolDefinition],
    ) -> Result<TurnResult, RunnerError>;

    async fn generate_turn_stream(
        &self,
        req: &GenerationRequest,
        config: &RunnerConfig,
        tools: &[ToolDefinition],
        sink: &mut dyn DeltaSink,
    ) -> Result<TurnResult, RunnerError>;
}
