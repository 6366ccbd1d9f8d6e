// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Built-in `edit` tool (aliased from `edit_file_lines`, spec §4.E step 3):
//! unique-match search-and-replace, trimmed from the teacher's hunk-based
//! `edit_file.rs` down to the single case this gateway needs — find
//! `old_string` verbatim in the file and replace it with `new_string`.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ToolError;
use crate::tool::Tool;

pub struct EditTool;

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        "edit"
    }

    fn description(&self) -> &str {
        "Replaces an exact, unique occurrence of 'old_string' with 'new_string' in a file.\n\
         Fails if old_string is not found, or is found more than once — widen old_string\n\
         with more surrounding context to disambiguate."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path to the file to edit" },
                "old_string": { "type": "string", "description": "Exact text to replace" },
                "new_string": { "type": "string", "description": "Replacement text" }
            },
            "required": ["path", "old_string", "new_string"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, input: &Value) -> Result<Value, ToolError> {
        let path = input
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidInput("missing required parameter 'path'".into()))?
            .to_string();
        let old_string = input
            .get("old_string")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidInput("missing required parameter 'old_string'".into()))?;
        let new_string = input
            .get("new_string")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidInput("missing required parameter 'new_string'".into()))?;

        if old_string.is_empty() {
            return Err(ToolError::InvalidInput("'old_string' must be non-empty".into()));
        }

        debug!(path = %path, "edit tool");

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ToolError::InvokeFailed(anyhow::anyhow!("read error: {e}")))?;

        let occurrences = content.matches(old_string).count();
        if occurrences == 0 {
            return Err(ToolError::InvalidInput(format!(
                "old_string not found in {path}"
            )));
        }
        if occurrences > 1 {
            return Err(ToolError::InvalidInput(format!(
                "old_string is not unique in {path} ({occurrences} occurrences); add more context"
            )));
        }

        let updated = content.replacen(old_string, new_string, 1);
        tokio::fs::write(&path, &updated)
            .await
            .map_err(|e| ToolError::InvokeFailed(anyhow::anyhow!("write error: {e}")))?;

        Ok(json!({ "text": format!("edited {path}") }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn replaces_unique_occurrence() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "hello world").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let t = EditTool;
        t.invoke(&json!({"path": path, "old_string": "world", "new_string": "rust"}))
            .await
            .unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, "hello rust");
    }

    #[tokio::test]
    async fn missing_match_is_invalid_input() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "hello world").unwrap();
        let t = EditTool;
        let err = t
            .invoke(&json!({"path": file.path().to_str().unwrap(), "old_string": "nope", "new_string": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn ambiguous_match_is_invalid_input() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "foo foo").unwrap();
        let t = EditTool;
        let err = t
            .invoke(&json!({"path": file.path().to_str().unwrap(), "old_string": "foo", "new_string": "bar"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }
}
