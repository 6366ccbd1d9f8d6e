// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! `POST /agent/process` and `GET /agent/system-layers` (spec §6).

use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream;
use nextai_config::{AgentInputMessage, ContentSegment, Role};
use nextai_core::{AgentEvent, AgentRequest, Engine, EventSink, TurnOutcome, VecSink, DONE_FRAME};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::HttpError;
use crate::state::AppState;

/// Parses the `input` array of a process request body into
/// [`AgentInputMessage`]s. Each item may provide `content` (an array of
/// `{type, text, ...}` segments) or the convenience shortcut `text`
/// (wrapped as a single text segment).
fn parse_input(value: &Value) -> Result<Vec<AgentInputMessage>, HttpError> {
    let Some(items) = value.get("input").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let role = match item.get("role").and_then(Value::as_str) {
            Some("assistant") => Role::Assistant,
            Some("system") => Role::System,
            Some("tool") => Role::Tool,
            _ => Role::User,
        };
        let content = if let Some(segments) = item.get("content").and_then(Value::as_array) {
            segments
                .iter()
                .map(|s| {
                    let kind = s.get("type").and_then(Value::as_str).unwrap_or("text").to_string();
                    let text = s.get("text").and_then(Value::as_str).map(|t| t.to_string());
                    let mut extra = std::collections::HashMap::new();
                    if let Some(obj) = s.as_object() {
                        for (k, v) in obj {
                            if k != "type" && k != "text" {
                                extra.insert(k.clone(), v.clone());
                            }
                        }
                    }
                    ContentSegment { kind, text, extra }
                })
                .collect()
        } else if let Some(text) = item.get("text").and_then(Value::as_str) {
            vec![ContentSegment::text(text)]
        } else {
            return Err(HttpError::bad_request("invalid_request", "input item has neither content nor text"));
        };
        out.push(AgentInputMessage::new(role, content));
    }
    Ok(out)
}

fn build_request(body: Value) -> Result<AgentRequest, HttpError> {
    let input = parse_input(&body)?;
    let session_id = body.get("session_id").and_then(Value::as_str).unwrap_or_default().to_string();
    let user_id = body.get("user_id").and_then(Value::as_str).unwrap_or_default().to_string();
    let channel = body.get("channel").and_then(Value::as_str).unwrap_or("console").to_string();
    let stream = body.get("stream").and_then(Value::as_bool).unwrap_or(false);
    let biz_params = body.get("biz_params").cloned().unwrap_or_else(|| serde_json::json!({}));
    Ok(AgentRequest { input, session_id, user_id, channel, stream, biz_params, raw_body: body })
}

pub async fn process(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let stream = body.get("stream").and_then(Value::as_bool).unwrap_or(false);
    let req = match build_request(body) {
        Ok(r) => r,
        Err(e) => return e.into_response(),
    };

    if stream {
        process_stream(state.engine, req).await
    } else {
        process_sync(state.engine, req).await.into_response()
    }
}

async fn process_sync(engine: std::sync::Arc<Engine>, req: AgentRequest) -> Response {
    let mut sink = VecSink::default();
    match engine.run_turn(req, &mut sink).await {
        Ok(TurnOutcome::Completed { reply }) => {
            (StatusCode::OK, Json(serde_json::json!({ "reply": reply, "events": sink.0 }))).into_response()
        }
        // stream=false never yields StreamedError (the engine returns Err
        // directly before the stream has started, §7).
        Ok(TurnOutcome::StreamedError) => {
            HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, "runner_error", "unexpected streamed error in non-stream mode").into_response()
        }
        Err(e) => HttpError::from(e).into_response(),
    }
}

/// Sink that forwards each event as an SSE frame through an mpsc channel,
/// flushing synchronously per event (spec §5 "streaming back-pressure":
/// "emitters MUST call it synchronously to avoid buffering deltas
/// indefinitely").
struct ChannelSink {
    tx: mpsc::Sender<String>,
}

#[async_trait::async_trait]
impl EventSink for ChannelSink {
    async fn emit(&mut self, event: AgentEvent) {
        let _ = self.tx.send(event.to_sse_frame()).await;
    }
}

async fn process_stream(engine: std::sync::Arc<Engine>, req: AgentRequest) -> Response {
    let (tx, rx) = mpsc::channel::<String>(64);

    tokio::spawn(async move {
        let mut sink = ChannelSink { tx: tx.clone() };
        if let Err(e) = engine.run_turn(req, &mut sink).await {
            // A failure that short-circuited before the engine's own
            // `fail()` helper ran (e.g. a store error while resolving the
            // chat, before `step_started` was ever emitted). The response
            // headers are already committed to `text/event-stream` by the
            // time this task runs, so surface it as an `error` event rather
            // than silently emitting only `[DONE]`.
            let http_err = crate::error::HttpError::from(e);
            let _ = tx.send(http_err.to_sse_error_frame()).await;
        }
        let _ = tx.send(DONE_FRAME.to_string()).await;
    });

    let body_stream = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|frame| (Ok::<_, std::convert::Infallible>(axum::body::Bytes::from(frame)), rx))
    });
    let body = axum::body::Body::from_stream(body_stream);

    axum::http::Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"))
        .header(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"))
        .header(header::CONNECTION, HeaderValue::from_static("keep-alive"))
        .header("X-Accel-Buffering", HeaderValue::from_static("no"))
        .body(body)
        .unwrap()
        .into_response()
}

/// `GET /agent/system-layers` (spec §6): gated by
/// `GatewayConfig::system_layers_endpoint_enabled`; 404 when disabled.
pub async fn system_layers(State(state): State<AppState>) -> Response {
    if !state.config.system_layers_endpoint_enabled {
        return HttpError::not_found("system layers endpoint is disabled").into_response();
    }
    let layers = nextai_core::system_layers();
    Json(serde_json::json!({ "layers": layers })).into_response()
}
