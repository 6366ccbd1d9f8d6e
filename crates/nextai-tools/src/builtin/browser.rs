// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Built-in `browser` tool (aliased from `web_browser`, spec §4.E step 3),
//! gated behind `NEXTAI_ENABLE_BROWSER_TOOL` (spec §6). Grounded on the
//! teacher's `WebFetchTool` (`crates/sven-tools/src/builtin/web_fetch.rs`).

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ToolError;
use crate::tool::Tool;

const DEFAULT_MAX_CHARS: usize = 50_000;

pub struct BrowserTool;

#[async_trait]
impl Tool for BrowserTool {
    fn name(&self) -> &str {
        "browser"
    }

    fn description(&self) -> &str {
        "Fetch content from an HTTP(S) URL and convert it to readable text. \
         HTML is converted to markdown-like plain text. Read-only, no authentication."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "The URL to fetch (http or https)" },
                "max_chars": { "type": "integer", "description": "Maximum characters to return (default 50000)" }
            },
            "required": ["url"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, input: &Value) -> Result<Value, ToolError> {
        let url = input
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidInput("missing required parameter 'url'".into()))?
            .to_string();
        let max_chars = input
            .get("max_chars")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_MAX_CHARS as u64) as usize;

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ToolError::InvalidInput("url must be http or https".into()));
        }

        debug!(url = %url, "browser tool");

        let text = fetch_url(&url, max_chars)
            .await
            .map_err(|e| ToolError::RuntimeUnavailable(format!("fetch error: {e}")))?;
        Ok(json!({ "text": text }))
    }
}

async fn fetch_url(url: &str, max_chars: usize) -> anyhow::Result<String> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .redirect(reqwest::redirect::Policy::limited(3))
        .user_agent("nextai-gateway/0.1")
        .build()?;

    let response = client.get(url).send().await?;
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_lowercase();

    let body = response.text().await?;

    let content = if content_type.contains("html") {
        html2text::from_read(body.as_bytes(), 100)
    } else if content_type.contains("json") {
        match serde_json::from_str::<Value>(&body) {
            Ok(v) => serde_json::to_string_pretty(&v).unwrap_or(body),
            Err(_) => body,
        }
    } else {
        body
    };

    if content.len() > max_chars {
        Ok(format!(
            "{}...[truncated at {max_chars} chars; total {} chars]",
            &content[..max_chars],
            content.len()
        ))
    } else {
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_non_http_scheme() {
        let t = BrowserTool;
        let err = t.invoke(&json!({"url": "ftp://example.com"})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn missing_url_is_invalid_input() {
        let t = BrowserTool;
        let err = t.invoke(&json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }
}
