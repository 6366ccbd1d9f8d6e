// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The built-in "demo" adapter (spec §4.E step 5): used whenever no active
//! provider is configured. Deterministic echo, grounded on the teacher's
//! `MockProvider` (`crates/sven-model/src/mock.rs`), which echoes the last
//! user message back as the assistant response.

use nextai_config::Role;

use crate::error::RunnerError;
use crate::runner::DeltaSink;
use crate::types::{GenerationRequest, TurnResult};

pub async fn generate_turn(req: &GenerationRequest) -> Result<TurnResult, RunnerError> {
    let last_user = req
        .messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.text_content())
        .unwrap_or_default();
    let text = format!("Echo: {last_user}");
    Ok(TurnResult {
        text: text.clone(),
        tool_calls: Vec::new(),
        raw_assistant_text: text,
    })
}

pub async fn generate_turn_stream(
    req: &GenerationRequest,
    sink: &mut dyn DeltaSink,
) -> Result<TurnResult, RunnerError> {
    let result = generate_turn(req).await?;
    sink.on_delta(&result.text).await;
    Ok(result)
}
