// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Built-in `view` tool (aliased from `view_file_lines`, spec §4.E step 3):
//! a trimmed form of the teacher's `ReadFileTool`
//! (`crates/sven-tools/src/builtin/read_file.rs`) — no image/binary
//! rendering, plain numbered-line text only.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ToolError;
use crate::tool::{OutputCategory, Tool};

const DEFAULT_LINE_LIMIT: usize = 200;
const MAX_BYTES: usize = 20_000;

pub struct ViewTool;

#[async_trait]
impl Tool for ViewTool {
    fn name(&self) -> &str {
        "view"
    }

    fn description(&self) -> &str {
        "Reads a text file. Default: 200 lines / 20 KB, whichever comes first.\n\
         Lines are formatted as L{n}:content (1-indexed). Use offset + limit to paginate."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path to the file" },
                "offset": { "type": "integer", "description": "1-indexed line number to start from (default 1)" },
                "limit": { "type": "integer", "description": "Maximum number of lines to return (default 200)" }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::FileContent
    }

    async fn invoke(&self, input: &Value) -> Result<Value, ToolError> {
        let path = input
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidInput("missing required parameter 'path'".into()))?
            .to_string();
        let offset = input.get("offset").and_then(Value::as_u64).unwrap_or(1) as usize;
        let limit = input
            .get("limit")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_LINE_LIMIT as u64) as usize;

        debug!(path = %path, offset, limit, "view tool");

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ToolError::InvokeFailed(anyhow::anyhow!("read error: {e}")))?;

        let lines: Vec<&str> = content.lines().collect();
        let total = lines.len();
        let start = offset.saturating_sub(1).min(total);
        let end = (start + limit).min(total);

        let mut bytes_used = 0usize;
        let mut rendered = Vec::new();
        for (i, line) in lines[start..end].iter().enumerate() {
            let numbered = format!("L{}:{}", start + i + 1, line);
            bytes_used += numbered.len() + 1;
            if bytes_used > MAX_BYTES {
                break;
            }
            rendered.push(numbered);
        }

        let mut text = rendered.join("\n");
        let shown_end = start + rendered.len();
        if shown_end < total {
            text.push_str(&format!("\n... {} more lines (next offset: {})", total - shown_end, shown_end + 1));
        }
        Ok(json!({ "text": text }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn reads_and_numbers_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "alpha\nbeta\ngamma").unwrap();
        let t = ViewTool;
        let out = t
            .invoke(&json!({"path": file.path().to_str().unwrap()}))
            .await
            .unwrap();
        let text = out["text"].as_str().unwrap();
        assert!(text.contains("L1:alpha"));
        assert!(text.contains("L3:gamma"));
    }

    #[tokio::test]
    async fn offset_and_limit_paginate() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 0..10 {
            writeln!(file, "line{i}").unwrap();
        }
        let t = ViewTool;
        let out = t
            .invoke(&json!({"path": file.path().to_str().unwrap(), "offset": 3, "limit": 2}))
            .await
            .unwrap();
        let text = out["text"].as_str().unwrap();
        assert!(text.contains("L3:line2"));
        assert!(text.contains("L4:line3"));
        assert!(!text.contains("L5:"));
        assert!(text.contains("next offset: 5"));
    }

    #[tokio::test]
    async fn missing_file_is_invoke_failed() {
        let t = ViewTool;
        let err = t.invoke(&json!({"path": "/no/such/file"})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvokeFailed(_)));
    }

    #[tokio::test]
    async fn missing_path_is_invalid_input() {
        let t = ViewTool;
        let err = t.invoke(&json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }
}
