// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Built-in `search` tool (aliased from `web_search`, spec §4.E step 3),
//! gated behind `NEXTAI_ENABLE_SEARCH_TOOL` (spec §6). Grounded on the
//! teacher's `WebSearchTool` (`crates/sven-tools/src/builtin/web_search.rs`).

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ToolError;
use crate::tool::Tool;

#[derive(Default)]
pub struct SearchTool {
    /// Optional API key override (falls back to the `BRAVE_API_KEY` env var).
    pub api_key: Option<String>,
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Real-time web search. Requires a configured Brave Search API key. \
         count: 1-10 (default 5)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" },
                "count": { "type": "integer", "description": "Number of results to return (default 5, max 10)" }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, input: &Value) -> Result<Value, ToolError> {
        let query = input
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidInput("missing required parameter 'query'".into()))?
            .to_string();
        let count = input.get("count").and_then(Value::as_u64).unwrap_or(5).min(10) as usize;

        debug!(query = %query, count, "search tool");

        let api_key = self
            .api_key
            .clone()
            .or_else(|| std::env::var("BRAVE_API_KEY").ok())
            .ok_or_else(|| {
                ToolError::RuntimeUnavailable(
                    "no Brave Search API key configured; set BRAVE_API_KEY".into(),
                )
            })?;

        let text = brave_search(&query, count, &api_key)
            .await
            .map_err(|e| ToolError::RuntimeUnavailable(format!("search error: {e}")))?;
        Ok(json!({ "text": text }))
    }
}

async fn brave_search(query: &str, count: usize, api_key: &str) -> anyhow::Result<String> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(15))
        .user_agent("nextai-gateway/0.1")
        .build()?;

    let url = format!(
        "https://api.search.brave.com/res/v1/web/search?q={}&count={count}",
        urlencode(query)
    );

    let resp = client
        .get(&url)
        .header("Accept", "application/json")
        .header("X-Subscription-Token", api_key)
        .send()
        .await?;

    if !resp.status().is_success() {
        anyhow::bail!("Brave API returned status {}", resp.status());
    }

    let body: Value = resp.json().await?;
    let results = body
        .get("web")
        .and_then(|w| w.get("results"))
        .and_then(Value::as_array)
        .map(|arr| arr.as_slice())
        .unwrap_or(&[]);

    if results.is_empty() {
        return Ok("(no results)".to_string());
    }

    let mut output = Vec::new();
    for (i, r) in results.iter().enumerate().take(count) {
        let title = r.get("title").and_then(Value::as_str).unwrap_or("(no title)");
        let url = r.get("url").and_then(Value::as_str).unwrap_or("");
        let desc = r.get("description").and_then(Value::as_str).unwrap_or("");
        output.push(format!("{}. **{title}**\n   {url}\n   {desc}", i + 1));
    }
    Ok(output.join("\n\n"))
}

fn urlencode(s: &str) -> String {
    let mut encoded = String::new();
    for c in s.chars() {
        match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' | '~' => encoded.push(c),
            ' ' => encoded.push('+'),
            c => {
                for byte in c.to_string().as_bytes() {
                    encoded.push_str(&format!("%{byte:02X}"));
                }
            }
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_requires_query() {
        let t = SearchTool::default();
        let schema = t.parameters_schema();
        let required = schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v.as_str() == Some("query")));
    }

    #[tokio::test]
    async fn returns_error_without_api_key() {
        std::env::remove_var("BRAVE_API_KEY");
        let t = SearchTool { api_key: None };
        let err = t.invoke(&json!({"query": "test"})).await.unwrap_err();
        assert!(matches!(err, ToolError::RuntimeUnavailable(_)));
    }
}
