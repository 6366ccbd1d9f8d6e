// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Tool Registry error kinds (spec §4.C, mapped to HTTP by §7).

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("tool '{0}' is disabled")]
    Disabled(String),
    #[error("tool '{0}' is not supported")]
    NotSupported(String),
    /// Input-validation sentinel recognized by the Error Mapper and
    /// downgraded from a generic invocation failure (§4.C).
    #[error("{0}")]
    InvalidInput(String),
    #[error("tool runtime unavailable: {0}")]
    RuntimeUnavailable(String),
    #[error("tool invocation failed: {0}")]
    InvokeFailed(#[from] anyhow::Error),
    #[error("tool produced an invalid result: {0}")]
    InvalidResult(String),
}
