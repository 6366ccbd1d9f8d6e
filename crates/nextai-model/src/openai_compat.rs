// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Generic OpenAI-compatible `/chat/completions` adapter.
//!
//! Grounded on the teacher's `OpenAICompatProvider`
//! (`crates/sven-model/src/openai_compat.rs`) — the shared base roughly two
//! dozen providers speak. The concrete wire adapters are out of scope for
//! this core (§1); this single adapter stands in for "some HTTP provider
//! exists" so the Runner port has a real, non-demo code path to exercise.

use std::time::Duration;

use futures::StreamExt;
use serde_json::{json, Value};
use tracing::debug;

use nextai_config::Role;

use crate::error::RunnerError;
use crate::repair::parse_tool_arguments;
use crate::runner::DeltaSink;
use crate::types::{GenerationRequest, RunnerConfig, ToolCallRequest, ToolDefinition, TurnResult};

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
        Role::Tool => "tool",
    }
}

/// Converts the working input list into the OpenAI `messages` array,
/// carrying forward `metadata.tool_calls` (assistant announcements) and
/// `metadata.tool_call_id` (tool replies) exactly as the spec's Agent Input
/// Message shape requires (§3).
fn build_messages(req: &GenerationRequest) -> Vec<Value> {
    req.messages
        .iter()
        .map(|m| {
            let mut obj = serde_json::Map::new();
            obj.insert("role".into(), json!(role_str(m.role)));
            obj.insert("content".into(), json!(m.text_content()));
            if let Some(meta) = &m.metadata {
                if let Some(tool_calls) = meta.get("tool_calls") {
                    obj.insert("tool_calls".into(), tool_calls.clone());
                }
                if let Some(id) = meta.get("tool_call_id") {
                    obj.insert("tool_call_id".into(), id.clone());
                }
                if let Some(name) = meta.get("name") {
                    obj.insert("name".into(), name.clone());
                }
            }
            Value::Object(obj)
        })
        .collect()
}

fn build_tools(tools: &[ToolDefinition]) -> Option<Value> {
    if tools.is_empty() {
        return None;
    }
    Some(Value::Array(
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect(),
    ))
}

fn build_request_body(req: &GenerationRequest, config: &RunnerConfig, tools: &[ToolDefinition], stream: bool) -> Value {
    let mut body = serde_json::Map::new();
    body.insert("model".into(), json!(config.model));
    body.insert("messages".into(), json!(build_messages(req)));
    body.insert("stream".into(), json!(stream));
    if let Some(t) = build_tools(tools) {
        body.insert("tools".into(), t);
    }
    Value::Object(body)
}

fn client(config: &RunnerConfig) -> Result<reqwest::Client, RunnerError> {
    let mut builder = reqwest::Client::builder();
    if config.timeout_ms > 0 {
        builder = builder.timeout(Duration::from_millis(config.timeout_ms));
    }
    builder
        .build()
        .map_err(|e| RunnerError::ProviderRequestFailed(e.to_string()))
}

fn request_builder(
    http: &reqwest::Client,
    config: &RunnerConfig,
    body: &Value,
) -> reqwest::RequestBuilder {
    let url = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
    let mut rb = http.post(url).json(body);
    if !config.api_key.is_empty() {
        rb = rb.bearer_auth(&config.api_key);
    }
    for (k, v) in &config.headers {
        rb = rb.header(k, v);
    }
    rb
}

/// Extracts `{text, tool_calls, raw_assistant_text}` from a non-streaming
/// `/chat/completions` response body, repairing malformed tool-call JSON
/// where possible and surfacing `RunnerError::InvalidToolCall` otherwise.
fn parse_completion(body: &Value) -> Result<TurnResult, RunnerError> {
    let message = body
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| RunnerError::ProviderInvalidReply("provider response missing choices[0].message".into()))?;

    let text = message.get("content").and_then(Value::as_str).unwrap_or("").to_string();

    let mut tool_calls = Vec::new();
    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            let id = call.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
            let name = call
                .pointer("/function/name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let raw_args = call
                .pointer("/function/arguments")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            match parse_tool_arguments(&raw_args) {
                Ok(arguments) => tool_calls.push(ToolCallRequest { id, name, arguments }),
                Err(err) => {
                    return Err(RunnerError::InvalidToolCall {
                        call_id: id,
                        name,
                        arguments_raw: raw_args,
                        err,
                    })
                }
            }
        }
    }

    if text.is_empty() && tool_calls.is_empty() {
        return Err(RunnerError::ProviderInvalidReply(
            "provider response has empty content".into(),
        ));
    }

    Ok(TurnResult {
        text: text.clone(),
        tool_calls,
        raw_assistant_text: text,
    })
}

pub async fn generate_turn(
    req: &GenerationRequest,
    config: &RunnerConfig,
    tools: &[ToolDefinition],
) -> Result<TurnResult, RunnerError> {
    if config.base_url.is_empty() {
        return Err(RunnerError::ProviderNotConfigured);
    }
    let http = client(config)?;
    let body = build_request_body(req, config, tools, false);
    debug!(provider = %config.provider_id, model = %config.model, "openai_compat: sending completion request");

    let resp = request_builder(&http, config, &body)
        .send()
        .await
        .map_err(|e| RunnerError::ProviderRequestFailed(e.to_string()))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        return Err(RunnerError::ProviderRequestFailed(format!("{status}: {text}")));
    }

    let json_body: Value = resp
        .json()
        .await
        .map_err(|e| RunnerError::ProviderInvalidReply(format!("response is not valid JSON: {e}")))?;
    parse_completion(&json_body)
}

/// Streaming variant: reads the SSE body line by line, forwarding each
/// `choices[0].delta.content` fragment to `sink` as it arrives, and
/// accumulating tool-call argument fragments by index until `[DONE]`.
pub async fn generate_turn_stream(
    req: &GenerationRequest,
    config: &RunnerConfig,
    tools: &[ToolDefinition],
    sink: &mut dyn DeltaSink,
) -> Result<TurnResult, RunnerError> {
    if config.base_url.is_empty() {
        return Err(RunnerError::ProviderNotConfigured);
    }
    let http = client(config)?;
    let body = build_request_body(req, config, tools, true);

    let resp = request_builder(&http, config, &body)
        .send()
        .await
        .map_err(|e| RunnerError::ProviderRequestFailed(e.to_string()))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        return Err(RunnerError::ProviderRequestFailed(format!("{status}: {text}")));
    }

    let mut stream = resp.bytes_stream();
    let mut buf = String::new();
    let mut text = String::new();
    let mut pending: Vec<PendingCall> = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| RunnerError::ProviderRequestFailed(e.to_string()))?;
        buf.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(pos) = buf.find("\n\n") {
            let line = buf[..pos].to_string();
            buf.drain(..pos + 2);
            let Some(data) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) else {
                continue;
            };
            let data = data.trim();
            if data == "[DONE]" {
                continue;
            }
            let Ok(event) = serde_json::from_str::<Value>(data) else {
                continue;
            };
            apply_delta_event(&event, &mut text, &mut pending, sink).await;
        }
    }

    let tool_calls = finish_pending(pending)?;
    if text.is_empty() && tool_calls.is_empty() {
        return Err(RunnerError::ProviderInvalidReply(
            "provider response has empty content".into(),
        ));
    }
    Ok(TurnResult {
        text: text.clone(),
        tool_calls,
        raw_assistant_text: text,
    })
}

struct PendingCall {
    id: String,
    name: String,
    args_buf: String,
}

async fn apply_delta_event(
    event: &Value,
    text: &mut String,
    pending: &mut Vec<PendingCall>,
    sink: &mut dyn DeltaSink,
) {
    let Some(delta) = event.pointer("/choices/0/delta") else {
        return;
    };
    if let Some(content) = delta.get("content").and_then(Value::as_str) {
        if !content.is_empty() {
            text.push_str(content);
            sink.on_delta(content).await;
        }
    }
    if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            let index = call.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
            while pending.len() <= index {
                pending.push(PendingCall {
                    id: String::new(),
                    name: String::new(),
                    args_buf: String::new(),
                });
            }
            let slot = &mut pending[index];
            if let Some(id) = call.get("id").and_then(Value::as_str) {
                if !id.is_empty() {
                    slot.id = id.to_string();
                }
            }
            if let Some(name) = call.pointer("/function/name").and_then(Value::as_str) {
                if !name.is_empty() {
                    slot.name = name.to_string();
                }
            }
            if let Some(frag) = call.pointer("/function/arguments").and_then(Value::as_str) {
                slot.args_buf.push_str(frag);
            }
        }
    }
}

fn finish_pending(pending: Vec<PendingCall>) -> Result<Vec<ToolCallRequest>, RunnerError> {
    let mut out = Vec::with_capacity(pending.len());
    for call in pending {
        if call.name.is_empty() {
            continue;
        }
        match parse_tool_arguments(&call.args_buf) {
            Ok(arguments) => out.push(ToolCallRequest {
                id: call.id,
                name: call.name,
                arguments,
            }),
            Err(err) => {
                return Err(RunnerError::InvalidToolCall {
                    call_id: call.id,
                    name: call.name,
                    arguments_raw: call.args_buf,
                    err,
                })
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nextai_config::{ContentSegment, RuntimeMessage};

    #[test]
    fn parse_completion_extracts_text() {
        let body = json!({
            "choices": [{"message": {"content": "hello there"}}]
        });
        let r = parse_completion(&body).unwrap();
        assert_eq!(r.text, "hello there");
        assert!(r.tool_calls.is_empty());
    }

    #[test]
    fn parse_completion_extracts_tool_calls() {
        let body = json!({
            "choices": [{"message": {
                "content": "",
                "tool_calls": [{
                    "id": "call_1",
                    "function": {"name": "shell", "arguments": "{\"command\":\"ls\"}"}
                }]
            }}]
        });
        let r = parse_completion(&body).unwrap();
        assert_eq!(r.tool_calls.len(), 1);
        assert_eq!(r.tool_calls[0].name, "shell");
    }

    #[test]
    fn parse_completion_empty_content_is_invalid_reply() {
        let body = json!({"choices": [{"message": {"content": ""}}]});
        let err = parse_completion(&body).unwrap_err();
        assert!(matches!(err, RunnerError::ProviderInvalidReply(_)));
    }

    #[test]
    fn parse_completion_malformed_tool_call_json_is_invalid_tool_call() {
        let body = json!({
            "choices": [{"message": {
                "content": "",
                "tool_calls": [{
                    "id": "call_1",
                    "function": {"name": "shell", "arguments": "not json {{"}
                }]
            }}]
        });
        let err = parse_completion(&body).unwrap_err();
        assert!(matches!(err, RunnerError::InvalidToolCall { .. }));
    }

    #[test]
    fn build_messages_carries_tool_call_metadata() {
        let mut meta = std::collections::HashMap::new();
        meta.insert(
            "tool_calls".to_string(),
            json!([{"id": "1", "type": "function", "function": {"name": "shell", "arguments": "{}"}}]),
        );
        let mut msg = RuntimeMessage::new(Role::Assistant, vec![ContentSegment::text("")]);
        msg.metadata = Some(meta);
        let req = GenerationRequest { messages: vec![msg] };
        let built = build_messages(&req);
        assert!(built[0].get("tool_calls").is_some());
    }
}
