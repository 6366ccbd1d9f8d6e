// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use nextai_channels::ChannelRegistry;
use nextai_config::{ContentSegment, Role, RuntimeMessage};
use nextai_model::{
    DeltaSink, GenerationRequest, Runner, RunnerConfig, RunnerError, ToolCallRequest, ToolDefinition, TurnResult,
};
use nextai_store::Store;
use nextai_tools::ToolRegistry;
use serde_json::json;
use tokio::sync::Mutex as AsyncMutex;

use super::*;

/// A Runner whose replies are scripted in advance, one per call to
/// `generate_turn`/`generate_turn_stream`.
struct ScriptedRunner {
    replies: AsyncMutex<VecDeque<Result<TurnResult, RunnerError>>>,
}

impl ScriptedRunner {
    fn new(replies: Vec<Result<TurnResult, RunnerError>>) -> Self {
        Self { replies: AsyncMutex::new(replies.into()) }
    }

    async fn next(&self) -> Result<TurnResult, RunnerError> {
        self.replies.lock().await.pop_front().unwrap_or_else(|| Ok(TurnResult::default()))
    }
}

#[async_trait]
impl Runner for ScriptedRunner {
    async fn generate_turn(
        &self,
        _req: &GenerationRequest,
        _config: &RunnerConfig,
        _tools: &[ToolDefinition],
    ) -> Result<TurnResult, RunnerError> {
        self.next().await
    }

    async fn generate_turn_stream(
        &self,
        _req: &GenerationRequest,
        _config: &RunnerConfig,
        _tools: &[ToolDefinition],
        sink: &mut dyn DeltaSink,
    ) -> Result<TurnResult, RunnerError> {
        let result = self.next().await;
        if let Ok(turn) = &result {
            if turn.tool_calls.is_empty() && !turn.text.is_empty() {
                sink.on_delta(&turn.text).await;
            }
        }
        result
    }
}

fn text_turn(s: &str) -> Result<TurnResult, RunnerError> {
    Ok(TurnResult { text: s.to_string(), tool_calls: Vec::new(), raw_assistant_text: s.to_string() })
}

fn tool_call_turn(id: &str, name: &str, args: serde_json::Value) -> Result<TurnResult, RunnerError> {
    Ok(TurnResult {
        text: String::new(),
        tool_calls: vec![ToolCallRequest { id: id.to_string(), name: name.to_string(), arguments: args }],
        raw_assistant_text: String::new(),
    })
}

async fn new_store() -> (Arc<Store>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(dir.path()).await.unwrap());
    (store, dir)
}

fn base_request(stream: bool) -> AgentRequest {
    AgentRequest {
        input: vec![RuntimeMessage::new(Role::User, vec![ContentSegment::text("hello there")])],
        session_id: "sess-1".into(),
        user_id: "user-1".into(),
        channel: "console".into(),
        stream,
        biz_params: json!({}),
        raw_body: json!({}),
    }
}

#[tokio::test]
async fn plain_reply_completes_and_persists_chat() {
    let (store, _dir) = new_store().await;
    let runner: Arc<dyn Runner> = Arc::new(ScriptedRunner::new(vec![text_turn("hi there")]));
    let tools = Arc::new(ToolRegistry::new());
    let mut reg = ChannelRegistry::new();
    reg.register(nextai_channels::ConsoleChannel);
    let channels = Arc::new(reg);

    let engine = Engine::new(store.clone(), runner, tools, channels);
    let mut sink = VecSink::default();
    let outcome = engine.run_turn(base_request(false), &mut sink).await.unwrap();
    match outcome {
        TurnOutcome::Completed { reply } => assert_eq!(reply, "hi there"),
        _ => panic!("expected completion"),
    }
    assert!(sink.0.iter().any(|e| matches!(e, AgentEvent::Completed { .. })));

    store
        .read(|state| {
            let chat = state.find_chat_by_key("sess-1", "user-1", "console").expect("chat persisted");
            let hist = &state.histories[&chat.id];
            assert_eq!(hist.len(), 2);
            assert_eq!(hist[1].role, Role::Assistant);
            assert_eq!(chat.name, "hello there");
        })
        .await;
}

#[tokio::test]
async fn context_reset_clears_history_and_replies_with_fixed_text() {
    let (store, _dir) = new_store().await;
    let runner: Arc<dyn Runner> = Arc::new(ScriptedRunner::new(vec![text_turn("hi")]));
    let tools = Arc::new(ToolRegistry::new());
    let mut reg = ChannelRegistry::new();
    reg.register(nextai_channels::ConsoleChannel);
    let channels = Arc::new(reg);

    let engine = Engine::new(store.clone(), runner, tools, channels);
    let mut sink = VecSink::default();
    engine.run_turn(base_request(false), &mut sink).await.unwrap();

    let mut reset = base_request(false);
    reset.input = vec![RuntimeMessage::text(Role::User, "  /new  ")];
    let mut sink2 = VecSink::default();
    let outcome = engine.run_turn(reset, &mut sink2).await.unwrap();
    match outcome {
        TurnOutcome::Completed { reply } => assert_eq!(reply, CONTEXT_RESET_REPLY),
        _ => panic!("expected completion"),
    }
    store
        .read(|state| {
            assert!(state.find_chat_by_key("sess-1", "user-1", "console").is_none());
        })
        .await;
}

#[tokio::test]
async fn explicit_tool_shortcut_skips_the_runner() {
    let (store, _dir) = new_store().await;
    let runner: Arc<dyn Runner> = Arc::new(ScriptedRunner::new(vec![]));
    let mut tools = ToolRegistry::new();
    tools.register(EchoTool { name: "shell" });
    let tools = Arc::new(tools);
    let mut reg = ChannelRegistry::new();
    reg.register(nextai_channels::ConsoleChannel);
    let channels = Arc::new(reg);

    let engine = Engine::new(store, runner, tools, channels);
    let mut req = base_request(false);
    req.raw_body = json!({"shell": {"command": "pwd"}});
    let mut sink = VecSink::default();
    let outcome = engine.run_turn(req, &mut sink).await.unwrap();
    match outcome {
        TurnOutcome::Completed { reply } => assert!(reply.contains("pwd")),
        _ => panic!("expected completion"),
    }
    assert!(sink.0.iter().any(|e| e.is_tool_call()));
}

#[tokio::test]
async fn tool_call_from_model_is_dispatched_then_final_reply_returned() {
    let (store, _dir) = new_store().await;
    let runner: Arc<dyn Runner> = Arc::new(ScriptedRunner::new(vec![
        tool_call_turn("call-1", "echo", json!({"value": "x"})),
        text_turn("done"),
    ]));
    let mut tools = ToolRegistry::new();
    tools.register(EchoTool::default());
    let tools = Arc::new(tools);
    let mut reg = ChannelRegistry::new();
    reg.register(nextai_channels::ConsoleChannel);
    let channels = Arc::new(reg);

    let engine = Engine::new(store, runner, tools, channels);
    let mut sink = VecSink::default();
    let outcome = engine.run_turn(base_request(false), &mut sink).await.unwrap();
    match outcome {
        TurnOutcome::Completed { reply } => assert_eq!(reply, "done"),
        _ => panic!("expected completion"),
    }
    assert!(sink.0.iter().any(|e| e.is_tool_call()));
    assert!(sink.0.iter().any(|e| matches!(e, AgentEvent::ToolResult { tool_result, .. } if tool_result.ok)));
}

#[tokio::test]
async fn unsupported_tool_call_feeds_back_error_and_continues() {
    let (store, _dir) = new_store().await;
    let runner: Arc<dyn Runner> = Arc::new(ScriptedRunner::new(vec![
        tool_call_turn("call-1", "nonexistent", json!({})),
        text_turn("recovered"),
    ]));
    let tools = Arc::new(ToolRegistry::new());
    let mut reg = ChannelRegistry::new();
    reg.register(nextai_channels::ConsoleChannel);
    let channels = Arc::new(reg);

    let engine = Engine::new(store, runner, tools, channels);
    let mut sink = VecSink::default();
    let outcome = engine.run_turn(base_request(false), &mut sink).await.unwrap();
    match outcome {
        TurnOutcome::Completed { reply } => assert_eq!(reply, "recovered"),
        _ => panic!("expected completion"),
    }
    assert!(sink.0.iter().any(|e| matches!(e, AgentEvent::ToolResult { tool_result, .. } if !tool_result.ok)));
}

#[tokio::test]
async fn unconfigured_provider_fails_before_any_event_in_non_stream_mode() {
    let (store, _dir) = new_store().await;
    store
        .write::<()>(|state| {
            state.active_llm = nextai_config::ActiveLlm { provider_id: "openai".into(), model: "gpt-4o".into() };
            Ok(())
        })
        .await
        .unwrap();
    let runner: Arc<dyn Runner> = Arc::new(ScriptedRunner::new(vec![]));
    let tools = Arc::new(ToolRegistry::new());
    let mut reg = ChannelRegistry::new();
    reg.register(nextai_channels::ConsoleChannel);
    let channels = Arc::new(reg);

    let engine = Engine::new(store, runner, tools, channels);
    let mut sink = VecSink::default();
    let err = engine.run_turn(base_request(false), &mut sink).await.unwrap_err();
    assert_eq!(err.code(), "provider_not_configured");
    assert!(sink.0.is_empty());
}

#[tokio::test]
async fn unconfigured_provider_emits_error_event_in_stream_mode() {
    let (store, _dir) = new_store().await;
    store
        .write::<()>(|state| {
            state.active_llm = nextai_config::ActiveLlm { provider_id: "openai".into(), model: "gpt-4o".into() };
            Ok(())
        })
        .await
        .unwrap();
    let runner: Arc<dyn Runner> = Arc::new(ScriptedRunner::new(vec![]));
    let tools = Arc::new(ToolRegistry::new());
    let mut reg = ChannelRegistry::new();
    reg.register(nextai_channels::ConsoleChannel);
    let channels = Arc::new(reg);

    let engine = Engine::new(store, runner, tools, channels);
    let mut sink = VecSink::default();
    let outcome = engine.run_turn(base_request(true), &mut sink).await.unwrap();
    assert!(matches!(outcome, TurnOutcome::StreamedError));
    assert!(sink.0.iter().any(|e| matches!(e, AgentEvent::Error { meta, .. } if meta.code == "provider_not_configured")));
}

struct EchoTool {
    name: &'static str,
}

impl Default for EchoTool {
    fn default() -> Self {
        Self { name: "echo" }
    }
}

#[async_trait]
impl nextai_tools::Tool for EchoTool {
    fn name(&self) -> &str {
        self.name
    }
    fn description(&self) -> &str {
        "echoes its input"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        json!({"type": "object"})
    }
    async fn invoke(&self, input: &serde_json::Value) -> Result<serde_json::Value, nextai_tools::ToolError> {
        Ok(json!({"text": format!("echo:{input}")}))
    }
}
