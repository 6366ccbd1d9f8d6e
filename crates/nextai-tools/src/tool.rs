// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The tool trait every built-in implements (spec §4.C).

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ToolError;

/// Describes the shape of a tool's text output for context-aware
/// truncation by the agent turn engine. Each tool declares its own
/// category; callers never hard-code tool names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputCategory {
    /// Terminal / process output: keep the first and last lines so both the
    /// command preamble and the final result are visible.
    HeadTail,
    /// File content: keep a head and tail window with a separator.
    FileContent,
    /// Generic text: hard-truncate at the character boundary.
    #[default]
    Generic,
}

/// A handler registered under one tool name.
///
/// `invoke` returns a JSON object (the spec's `map<string,any>`, §4.C). If
/// the object carries a non-empty `text` field, the Tool Registry returns
/// that string verbatim; otherwise it serializes the whole object.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the tool's input.
    fn parameters_schema(&self) -> Value;
    fn output_category(&self) -> OutputCategory {
        OutputCategory::Generic
    }
    async fn invoke(&self, input: &Value) -> Result<Value, ToolError>;
}
