// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The Agent Turn Engine (spec §4.E) — the bounded, tool-augmented
//! generation loop, with optional live streaming, tool-call recovery on
//! malformed provider replies, and in-order event emission.
//!
//! Grounded on the teacher's `run_agentic_loop_cancellable` / `stream_one_turn`
//! shape in `crates/sven-core/src/agent.rs` (event-channel fan-out, per-step
//! tool-call accumulation) generalized to the spec's own event alphabet and
//! the store/runner/tool/channel ports this crate depends on.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use nextai_channels::ChannelRegistry;
use nextai_config::{normalize_provider_id, AgentInputMessage, Chat, ContentSegment, ProviderSetting, Role};
use nextai_model::{
    DeltaSink, GenerationRequest, Runner, RunnerConfig, RunnerError, ToolCallRequest, ToolDefinition,
};
use nextai_store::{Store, WriteOutcome};
use nextai_tools::ToolRegistry;
use serde_json::Value;

use crate::error::EngineError;
use crate::events::{AgentEvent, ErrorMeta, ToolCallPayload, ToolResultPayload};
use crate::layers::{auto_chat_name, system_messages};
use crate::request::{detect_explicit_tool_call, is_context_reset, AgentRequest, CONTEXT_RESET_REPLY};
use crate::text::{chunk_runes, compact_feedback, truncate_preview};

const TOOL_RESULT_PREVIEW_RUNES: usize = 160;
const DEFAULT_CHUNK_WIDTH: usize = 12;
const FEEDBACK_BUDGET_RUNES: usize = 500;

/// Sink for each event produced during one turn (§4.E). Non-stream callers
/// collect into a `Vec`; the HTTP layer writes each event as an SSE frame
/// and flushes synchronously (§5 "streaming back-pressure").
#[async_trait]
pub trait EventSink: Send {
    async fn emit(&mut self, event: AgentEvent);
}

/// Collects every emitted event in order, for the non-stream `{reply,
/// events}` response body.
#[derive(Default)]
pub struct VecSink(pub Vec<AgentEvent>);

#[async_trait]
impl EventSink for VecSink {
    async fn emit(&mut self, event: AgentEvent) {
        self.0.push(event);
    }
}

/// Outcome of [`Engine::run_turn`].
pub enum TurnOutcome {
    /// The turn finished normally; `reply` is the final assistant text
    /// dispatched through the channel.
    Completed { reply: String },
    /// Streaming mode only: a terminal `error` event was already emitted
    /// through the sink. The caller still owes the stream a `[DONE]` frame.
    StreamedError,
}

pub struct Engine {
    store: Arc<Store>,
    runner: Arc<dyn Runner>,
    tools: Arc<ToolRegistry>,
    channels: Arc<ChannelRegistry>,
}

impl Engine {
    pub fn new(
        store: Arc<Store>,
        runner: Arc<dyn Runner>,
        tools: Arc<ToolRegistry>,
        channels: Arc<ChannelRegistry>,
    ) -> Self {
        Self { store, runner, tools, channels }
    }

    /// Runs one full turn (spec §4.E steps 1–8), emitting events through
    /// `outer_sink` as they are produced.
    pub async fn run_turn(
        &self,
        req: AgentRequest,
        outer_sink: &mut dyn EventSink,
    ) -> Result<TurnOutcome, EngineError> {
        let mut tee = TeeSink::new(outer_sink);
        let sink = &mut tee;

        // Step 1: context reset.
        if is_context_reset(&req.input) {
            return self.run_context_reset(&req, sink).await;
        }

        // Step 2: resolve/create the chat, append user input, snapshot
        // active provider state.
        let Resolved { history, active_llm, providers, channel_cfg } =
            self.resolve_and_append(&req).await?;

        let effective_input = if history.is_empty() { req.input.clone() } else { history };

        // Steps 3–4: explicit tool-call shortcut skips the LLM entirely.
        let (reply, step_count) = match detect_explicit_tool_call(&req)? {
            Some(call) => {
                match self.run_explicit_tool_step(&call.name, &call.input, &mut *sink).await {
                    Ok(reply) => (reply, 1),
                    Err(e) => return self.fail(sink, req.stream, 1, e).await,
                }
            }
            None => {
                // Step 5: the generation loop.
                match self
                    .run_generation_loop(&req, effective_input, &active_llm, &providers, &mut *sink)
                    .await
                {
                    Ok((reply, steps)) => (reply, steps),
                    Err(Failure { step, err }) => return self.fail(sink, req.stream, step, err).await,
                }
            }
        };

        // Step 6: persist the assistant reply + chat naming + tool_call_notices.
        self.finalize_history(&req, &reply, tee.recorded.clone()).await?;

        // Step 7: dispatch through the channel.
        let overrides = req.biz_params.get("channel").cloned().unwrap_or_else(|| serde_json::json!({}));
        if let Err(e) = self
            .channels
            .send_text(&req.channel, &req.user_id, &req.session_id, &reply, &channel_cfg, &overrides)
            .await
        {
            return self.fail(&mut tee, req.stream, step_count.max(1), e.into()).await;
        }

        Ok(TurnOutcome::Completed { reply })
    }

    // ── Step 1: context reset ───────────────────────────────────────────

    async fn run_context_reset(
        &self,
        req: &AgentRequest,
        sink: &mut dyn EventSink,
    ) -> Result<TurnOutcome, EngineError> {
        self.store
            .write::<EngineError>(|state| {
                state.delete_chats_by_key(&req.session_id, &req.user_id, &req.channel);
                Ok(())
            })
            .await
            .map_err(unwrap_write)?;

        let channel_cfg = self
            .store
            .read(|state| state.channels.get(&req.channel.to_lowercase()).cloned())
            .await
            .unwrap_or_else(|| serde_json::json!({}));
        let overrides = req.biz_params.get("channel").cloned().unwrap_or_else(|| serde_json::json!({}));
        self.channels
            .send_text(&req.channel, &req.user_id, &req.session_id, CONTEXT_RESET_REPLY, &channel_cfg, &overrides)
            .await
            .map_err(EngineError::from)?;

        sink.emit(AgentEvent::StepStarted { step: 1 }).await;
        for chunk in chunk_runes(CONTEXT_RESET_REPLY, DEFAULT_CHUNK_WIDTH) {
            sink.emit(AgentEvent::AssistantDelta { step: 1, delta: chunk }).await;
        }
        sink.emit(AgentEvent::Completed { step: 1, reply: CONTEXT_RESET_REPLY.to_string() }).await;

        Ok(TurnOutcome::Completed { reply: CONTEXT_RESET_REPLY.to_string() })
    }

    // ── Step 2: chat resolution + history append ────────────────────────

    async fn resolve_and_append(&self, req: &AgentRequest) -> Result<Resolved, EngineError> {
        let user_messages = req.input.clone();
        let mut history_out = Vec::new();

        self.store
            .write::<EngineError>(|state| {
                let chat_id = state
                    .find_chat_by_key(&req.session_id, &req.user_id, &req.channel)
                    .map(|c| c.id.clone())
                    .unwrap_or_else(|| {
                        let chat = Chat::new(&req.session_id, &req.user_id, &req.channel);
                        let id = chat.id.clone();
                        state.chats.insert(id.clone(), chat);
                        id
                    });
                let hist = state.histories.entry(chat_id.clone()).or_default();
                hist.extend(user_messages.iter().cloned());
                if let Some(chat) = state.chats.get_mut(&chat_id) {
                    chat.updated_at = chrono::Utc::now();
                }
                history_out = state.histories.get(&chat_id).cloned().unwrap_or_default();
                Ok(())
            })
            .await
            .map_err(unwrap_write)?;

        let (active_llm, providers, channel_cfg) = self
            .store
            .read(|state| {
                (
                    state.active_llm.clone(),
                    state.providers.clone(),
                    state.channels.get(&req.channel.to_lowercase()).cloned().unwrap_or_else(|| serde_json::json!({})),
                )
            })
            .await;

        Ok(Resolved { history: history_out, active_llm, providers, channel_cfg })
    }

    // ── Steps 3–4: explicit tool call ───────────────────────────────────

    async fn run_explicit_tool_step(
        &self,
        name: &str,
        input: &Value,
        sink: &mut dyn EventSink,
    ) -> Result<String, EngineError> {
        sink.emit(AgentEvent::StepStarted { step: 1 }).await;
        sink.emit(AgentEvent::ToolCall {
            step: 1,
            tool_call: ToolCallPayload { name: name.to_string(), input: input.clone() },
        })
        .await;

        let reply = self.tools.invoke(name, input).await?;

        sink.emit(AgentEvent::ToolResult {
            step: 1,
            tool_result: ToolResultPayload {
                name: name.to_string(),
                ok: true,
                summary: truncate_preview(&reply, TOOL_RESULT_PREVIEW_RUNES),
            },
        })
        .await;

        for chunk in chunk_runes(&reply, DEFAULT_CHUNK_WIDTH) {
            sink.emit(AgentEvent::AssistantDelta { step: 1, delta: chunk }).await;
        }
        sink.emit(AgentEvent::Completed { step: 1, reply: reply.clone() }).await;

        Ok(reply)
    }

    // ── Step 5: the generation loop ─────────────────────────────────────

    async fn run_generation_loop(
        &self,
        req: &AgentRequest,
        effective_input: Vec<AgentInputMessage>,
        active_llm: &nextai_config::ActiveLlm,
        providers: &HashMap<String, ProviderSetting>,
        sink: &mut dyn EventSink,
    ) -> Result<(String, u32), Failure> {
        let config = resolve_runner_config(active_llm, providers)
            .map_err(|err| Failure { step: 1, err })?;
        let tool_defs = tool_definitions(&self.tools);

        let mut working_input = system_messages();
        working_input.extend(effective_input);

        let mut step: u32 = 1;
        loop {
            sink.emit(AgentEvent::StepStarted { step }).await;

            let gen_req = GenerationRequest { messages: working_input.clone() };
            let mut delta_sink = ForwardingDeltaSink { sink: &mut *sink, step, emitted: false };
            let result = if req.stream {
                self.runner.generate_turn_stream(&gen_req, &config, &tool_defs, &mut delta_sink).await
            } else {
                self.runner.generate_turn(&gen_req, &config, &tool_defs).await
            };
            let deltas_emitted = delta_sink.emitted;

            let turn = match result {
                Ok(t) => t,
                Err(RunnerError::InvalidToolCall { call_id, name, arguments_raw, err }) => {
                    self.recover_invalid_tool_call(&mut *sink, step, &call_id, &name, &arguments_raw, &err)
                        .await;
                    working_input.push(assistant_tool_calls_message(
                        "",
                        &[ToolCallRequest { id: call_id.clone(), name: name.clone(), arguments: Value::Null }],
                        &[arguments_raw.clone()],
                    ));
                    let feedback = format!(
                        "tool_error code=invalid_tool_input message=provider tool call arguments for {name} are invalid detail={err} raw_arguments={arguments_raw}"
                    );
                    working_input.push(tool_result_message(&call_id, &name, &compact_feedback(&feedback, FEEDBACK_BUDGET_RUNES)));
                    step += 1;
                    continue;
                }
                Err(other) => {
                    return Err(Failure { step, err: other.into() });
                }
            };

            if turn.tool_calls.is_empty() {
                let mut reply = turn.text.trim().to_string();
                if reply.is_empty() {
                    reply = "(empty reply)".to_string();
                }
                if !deltas_emitted {
                    for chunk in chunk_runes(&reply, DEFAULT_CHUNK_WIDTH) {
                        sink.emit(AgentEvent::AssistantDelta { step, delta: chunk }).await;
                    }
                }
                sink.emit(AgentEvent::Completed { step, reply: reply.clone() }).await;
                return Ok((reply, step));
            }

            working_input.push(assistant_tool_calls_raw_message(&turn.text, &turn.tool_calls));

            for call in &turn.tool_calls {
                sink.emit(AgentEvent::ToolCall {
                    step,
                    tool_call: ToolCallPayload { name: call.name.clone(), input: call.arguments.clone() },
                })
                .await;

                match self.tools.invoke(&call.name, &call.arguments).await {
                    Ok(text) => {
                        sink.emit(AgentEvent::ToolResult {
                            step,
                            tool_result: ToolResultPayload {
                                name: call.name.clone(),
                                ok: true,
                                summary: truncate_preview(&text, TOOL_RESULT_PREVIEW_RUNES),
                            },
                        })
                        .await;
                        working_input.push(tool_result_message(&call.id, &call.name, &text));
                    }
                    Err(err) => {
                        let engine_err: EngineError = err.into();
                        let feedback = compact_feedback(
                            &format!("tool_error code={} message={}", engine_err.code(), engine_err),
                            FEEDBACK_BUDGET_RUNES,
                        );
                        sink.emit(AgentEvent::ToolResult {
                            step,
                            tool_result: ToolResultPayload { name: call.name.clone(), ok: false, summary: feedback.clone() },
                        })
                        .await;
                        working_input.push(tool_result_message(&call.id, &call.name, &feedback));
                    }
                }
            }

            step += 1;
        }
    }

    async fn recover_invalid_tool_call(
        &self,
        sink: &mut dyn EventSink,
        step: u32,
        call_id: &str,
        name: &str,
        arguments_raw: &str,
        err: &anyhow::Error,
    ) {
        let input = serde_json::from_str(arguments_raw).unwrap_or_else(|_| Value::String(arguments_raw.to_string()));
        sink.emit(AgentEvent::ToolCall { step, tool_call: ToolCallPayload { name: name.to_string(), input } }).await;
        let feedback = compact_feedback(
            &format!(
                "tool_error code=invalid_tool_input message=provider tool call arguments for {name} are invalid detail={err} raw_arguments={arguments_raw}"
            ),
            FEEDBACK_BUDGET_RUNES,
        );
        sink.emit(AgentEvent::ToolResult {
            step,
            tool_result: ToolResultPayload { name: name.to_string(), ok: false, summary: feedback },
        })
        .await;
        let _ = call_id;
    }

    // ── Step 6: persist assistant message + naming + notices ───────────

    async fn finalize_history(
        &self,
        req: &AgentRequest,
        reply: &str,
        events_for_notices: Vec<AgentEvent>,
    ) -> Result<(), EngineError> {
        let notices = build_tool_call_notices(&events_for_notices);
        let session_id = req.session_id.clone();
        let user_id = req.user_id.clone();
        let channel = req.channel.clone();
        let reply = reply.to_string();
        let has_user_text = req.input.iter().any(|m| !m.text_content().trim().is_empty());
        let first_user_text = req.input.iter().find_map(|m| {
            let t = m.text_content();
            if t.trim().is_empty() { None } else { Some(t) }
        });

        self.store
            .write::<EngineError>(|state| {
                let chat_id = state
                    .find_chat_by_key(&session_id, &user_id, &channel)
                    .map(|c| c.id.clone());
                let Some(chat_id) = chat_id else {
                    // The chat may have been deleted concurrently (e.g. a
                    // racing /new); nothing to persist against.
                    return Ok(());
                };
                let mut msg = AgentInputMessage::text(Role::Assistant, reply.clone());
                if let Some(n) = &notices {
                    msg.metadata = Some(n.clone());
                }
                state.histories.entry(chat_id.clone()).or_default().push(msg);

                if let Some(chat) = state.chats.get_mut(&chat_id) {
                    chat.updated_at = chrono::Utc::now();
                    if chat.name == "New Chat" && has_user_text {
                        if let Some(text) = &first_user_text {
                            chat.name = auto_chat_name(text);
                        }
                    }
                }
                Ok(())
            })
            .await
            .map_err(unwrap_write)
    }

    // ── Shared error-path helper (spec §7: pre-stream vs mid-stream) ────

    async fn fail(
        &self,
        sink: &mut dyn EventSink,
        stream: bool,
        step: u32,
        err: EngineError,
    ) -> Result<TurnOutcome, EngineError> {
        if stream {
            sink.emit(AgentEvent::Error {
                step,
                meta: ErrorMeta { code: err.code().to_string(), message: err.to_string(), details: err.details() },
            })
            .await;
            Ok(TurnOutcome::StreamedError)
        } else {
            Err(err)
        }
    }
}

struct Resolved {
    history: Vec<AgentInputMessage>,
    active_llm: nextai_config::ActiveLlm,
    providers: HashMap<String, ProviderSetting>,
    channel_cfg: Value,
}

/// A terminal failure from the generation loop, tagged with the step it
/// occurred on (for the error event's `step` field in stream mode).
struct Failure {
    step: u32,
    err: EngineError,
}

/// Forwards Runner deltas into the sink as `assistant_delta` events,
/// tracking whether any were emitted this step (§4.E: "if no streaming
/// deltas were emitted this step, chunk the reply").
struct ForwardingDeltaSink<'a> {
    sink: &'a mut dyn EventSink,
    step: u32,
    emitted: bool,
}

#[async_trait]
impl DeltaSink for ForwardingDeltaSink<'_> {
    async fn on_delta(&mut self, delta: &str) {
        if delta.is_empty() {
            return;
        }
        self.emitted = true;
        self.sink.emit(AgentEvent::AssistantDelta { step: self.step, delta: delta.to_string() }).await;
    }
}

/// Records every event alongside forwarding it to the caller-supplied sink,
/// so step 6 (tool-call-notice computation) can see the full event list
/// regardless of whether the outer sink retains history itself.
struct TeeSink<'a> {
    inner: &'a mut dyn EventSink,
    recorded: Vec<AgentEvent>,
}

impl<'a> TeeSink<'a> {
    fn new(inner: &'a mut dyn EventSink) -> Self {
        Self { inner, recorded: Vec::new() }
    }
}

#[async_trait]
impl EventSink for TeeSink<'_> {
    async fn emit(&mut self, event: AgentEvent) {
        self.recorded.push(event.clone());
        self.inner.emit(event).await;
    }
}

fn tool_definitions(tools: &ToolRegistry) -> Vec<ToolDefinition> {
    tools
        .schemas()
        .into_iter()
        .map(|s| ToolDefinition { name: s.name, description: s.description, parameters: s.parameters })
        .collect()
}

/// Resolves the Runner's generation config from the active provider (§4.E
/// step 5): no active provider ⇒ the demo adapter; otherwise the provider
/// must exist and be enabled, and the model must resolve through its alias
/// catalog when one is declared.
fn resolve_runner_config(
    active_llm: &nextai_config::ActiveLlm,
    providers: &HashMap<String, ProviderSetting>,
) -> Result<RunnerConfig, EngineError> {
    if active_llm.is_empty() {
        return Ok(RunnerConfig::demo());
    }
    let key = normalize_provider_id(&active_llm.provider_id);
    let provider = providers.get(&key).ok_or(EngineError::ProviderNotConfigured)?;
    if !provider.is_enabled() {
        return Err(EngineError::ProviderDisabled(active_llm.provider_id.clone()));
    }
    let model = if provider.model_aliases.is_empty() {
        active_llm.model.clone()
    } else {
        provider
            .model_aliases
            .get(&active_llm.model)
            .cloned()
            .ok_or_else(|| EngineError::ModelNotFound(active_llm.model.clone()))?
    };
    Ok(RunnerConfig {
        provider_id: key,
        model,
        api_key: provider.api_key.clone(),
        base_url: provider.base_url.clone(),
        adapter_id: "openai_compat".to_string(),
        headers: provider.headers.clone(),
        timeout_ms: provider.timeout_ms,
    })
}

fn assistant_tool_calls_raw_message(text: &str, calls: &[ToolCallRequest]) -> AgentInputMessage {
    let raw_args: Vec<String> = calls.iter().map(|c| c.arguments.to_string()).collect();
    assistant_tool_calls_message(text, calls, &raw_args)
}

fn assistant_tool_calls_message(text: &str, calls: &[ToolCallRequest], raw_args: &[String]) -> AgentInputMessage {
    let mut content = Vec::new();
    if !text.is_empty() {
        content.push(ContentSegment::text(text));
    }
    let tool_calls: Vec<Value> = calls
        .iter()
        .zip(raw_args.iter())
        .map(|(c, raw)| {
            serde_json::json!({
                "id": c.id,
                "type": "function",
                "function": { "name": c.name, "arguments": raw },
            })
        })
        .collect();
    let mut metadata = HashMap::new();
    metadata.insert("tool_calls".to_string(), Value::Array(tool_calls));
    let mut msg = AgentInputMessage::new(Role::Assistant, content);
    msg.metadata = Some(metadata);
    msg
}

fn tool_result_message(call_id: &str, name: &str, content: &str) -> AgentInputMessage {
    let mut metadata = HashMap::new();
    metadata.insert("tool_call_id".to_string(), Value::String(call_id.to_string()));
    metadata.insert("name".to_string(), Value::String(name.to_string()));
    let mut msg = AgentInputMessage::text(Role::Tool, content);
    msg.metadata = Some(metadata);
    msg
}

/// Builds `metadata.tool_call_notices` from the emitted events (§4.E step 6).
/// `None` when no `tool_call` events were emitted this turn.
fn build_tool_call_notices(events: &[AgentEvent]) -> Option<HashMap<String, Value>> {
    let tool_call_indices: Vec<usize> =
        events.iter().enumerate().filter(|(_, e)| e.is_tool_call()).map(|(i, _)| i).collect();
    if tool_call_indices.is_empty() {
        return None;
    }
    let notices: Vec<Value> = tool_call_indices
        .iter()
        .map(|&i| serde_json::json!({ "raw": serde_json::to_value(&events[i]).unwrap_or(Value::Null) }))
        .collect();
    let text_order = events.iter().position(|e| e.is_assistant_delta()).map(|i| i as i64 + 1);
    let tool_order = tool_call_indices.first().map(|&i| i as i64 + 1);

    let mut meta = HashMap::new();
    meta.insert("tool_call_notices".to_string(), Value::Array(notices));
    if let Some(t) = text_order {
        meta.insert("text_order".to_string(), Value::from(t));
    }
    if let Some(t) = tool_order {
        meta.insert("tool_order".to_string(), Value::from(t));
    }
    Some(meta)
}

fn unwrap_write(e: WriteOutcome<EngineError>) -> EngineError {
    match e {
        WriteOutcome::User(e) => e,
        WriteOutcome::Store(e) => e.into(),
    }
}

#[cfg(test)]
mod tests;
