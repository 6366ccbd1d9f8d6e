// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Runner port and adapters for the agent turn engine (spec §4.B).
//!
//! The turn engine depends only on [`Runner`]; everything else here is
//! implementation detail of the two adapters this crate ships: the
//! always-available `demo` echo adapter and a generic `openai_compat` HTTP
//! adapter.

mod demo;
mod error;
mod openai_compat;
mod repair;
mod runner;
mod types;

pub use error::RunnerError;
pub use repair::parse_tool_arguments;
pub use runner::{DeltaSink, NullSink, Runner};
pub use types::{
    GenerationRequest, RunnerConfig, ToolCallRequest, ToolDefinition, TurnResult, DEMO_PROVIDER_ID,
};

use async_trait::async_trait;

const ADAPTER_OPENAI_COMPAT: &str = "openai_compat";

/// The concrete [`Runner`] wired into the gateway binary. Dispatches to the
/// demo adapter when `config.is_demo()`, otherwise routes on
/// `config.adapter_id`.
#[derive(Debug, Default, Clone, Copy)]
pub struct GatewayRunner;

impl GatewayRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Runner for GatewayRunner {
    async fn generate_turn(
        &self,
        req: &GenerationRequest,
        config: &RunnerConfig,
        tools: &[ToolDefinition],
    ) -> Result<TurnResult, RunnerError> {
        if config.is_demo() {
            return demo::generate_turn(req).await;
        }
        match config.adapter_id.as_str() {
            ADAPTER_OPENAI_COMPAT => openai_compat::generate_turn(req, config, tools).await,
            other => Err(RunnerError::ProviderNotSupported(other.to_string())),
        }
    }

    async fn generate_turn_stream(
        &self,
        req: &GenerationRequest,
        config: &RunnerConfig,
        tools: &[ToolDefinition],
        sink: &mut dyn DeltaSink,
    ) -> Result<TurnResult, RunnerError> {
        if config.is_demo() {
            return demo::generate_turn_stream(req, sink).await;
        }
        match config.adapter_id.as_str() {
            ADAPTER_OPENAI_COMPAT => openai_compat::generate_turn_stream(req, config, tools, sink).await,
            other => Err(RunnerError::ProviderNotSupported(other.to_string())),
        }
    }
}
