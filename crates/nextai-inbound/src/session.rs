// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! One inbound session: token fetch, gateway-url fetch, websocket dial,
//! opcode state machine, heartbeat task (spec §4.H steps 1-6).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use nextai_config::{AgentInputMessage, Role};
use nextai_core::{AgentRequest, Engine, VecSink};
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::error::InboundError;
use crate::opcode::{
    HeartbeatFrame, HelloPayload, IdentifyFrame, InboundFrame, MessageDispatch, OP_DISPATCH, OP_HELLO,
    OP_INVALID_SESSION, OP_RECONNECT, USER_MESSAGE_EVENTS,
};
use crate::state::InboundStateHandle;

const TOKEN_RESPONSE_CAP_BYTES: usize = 1024 * 1024;
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const READ_DEADLINE: Duration = Duration::from_secs(90);

#[derive(Debug, Clone)]
pub struct QqConfig {
    pub app_id: String,
    pub client_secret: String,
    pub api_base: String,
    pub token_url: String,
}

impl QqConfig {
    /// `join(app_id, client_secret, api_base, token_url, "")` (spec §4.H).
    pub fn signature(&self) -> String {
        [self.app_id.as_str(), self.client_secret.as_str(), self.api_base.as_str(), self.token_url.as_str()].join("\u{1f}")
    }

    pub fn from_value(v: &Value) -> Option<Self> {
        let get = |k: &str| v.get(k).and_then(Value::as_str).map(str::to_string);
        Some(Self {
            app_id: get("app_id")?,
            client_secret: get("client_secret")?,
            api_base: get("api_base")?,
            token_url: get("token_url")?,
        })
    }
}

pub(crate) async fn fetch_access_token(cfg: &QqConfig) -> Result<String, InboundError> {
    let client = reqwest::Client::new();
    let resp = client
        .post(&cfg.token_url)
        .json(&serde_json::json!({"appId": cfg.app_id, "clientSecret": cfg.client_secret}))
        .send()
        .await
        .map_err(|e| InboundError::TokenRequestFailed(e.to_string()))?;

    let bytes = resp.bytes().await.map_err(|e| InboundError::TokenRequestFailed(e.to_string()))?;
    if bytes.len() > TOKEN_RESPONSE_CAP_BYTES {
        return Err(InboundError::TokenRequestFailed("token response exceeded 1 MiB cap".into()));
    }
    let body: Value = serde_json::from_slice(&bytes).map_err(|e| InboundError::TokenRequestFailed(e.to_string()))?;
    body.get("access_token")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| InboundError::TokenRequestFailed("response missing access_token".into()))
}

async fn fetch_gateway_url(cfg: &QqConfig, token: &str) -> Result<String, InboundError> {
    let client = reqwest::Client::new();
    let resp = client
        .get(format!("{}/gateway", cfg.api_base.trim_end_matches('/')))
        .header("Authorization", format!("QQBot {token}"))
        .send()
        .await
        .map_err(|e| InboundError::GatewayUrlFailed(e.to_string()))?;
    let body: Value = resp.json().await.map_err(|e| InboundError::GatewayUrlFailed(e.to_string()))?;
    body.get("url")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| InboundError::GatewayUrlFailed("response missing url".into()))
}

/// Runs one full session: dial, identify, heartbeat, dispatch loop.
/// Returns once the session ends, classifying the terminal cause so the
/// supervisor can decide on backoff and intent fallback.
pub async fn run_session(
    cfg: QqConfig,
    token: String,
    intents: u32,
    engine: Arc<Engine>,
    runtime: InboundStateHandle,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), InboundError> {
    let gateway_url = fetch_gateway_url(&cfg, &token).await?;
    runtime.update(|s| s.gateway_url = Some(gateway_url.clone())).await;

    let (ws, _resp) = timeout(HANDSHAKE_TIMEOUT, tokio_tungstenite::connect_async(&gateway_url))
        .await
        .map_err(|_| InboundError::DialFailed("handshake timed out".into()))?
        .map_err(|e| InboundError::DialFailed(e.to_string()))?;

    let (mut sink, mut stream) = ws.split();
    runtime
        .update(|s| {
            s.connected = true;
            s.last_connected_at = Some(Utc::now());
        })
        .await;
    debug!(gateway_url, "nextai-inbound: session connected");

    let last_seq = Arc::new(AtomicU64::new(0));
    let mut heartbeat_task: Option<tokio::task::JoinHandle<()>> = None;
    let (hb_tx, mut hb_rx) = tokio::sync::mpsc::unbounded_channel::<Message>();
    let result = loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break Ok(());
                }
            }
            Some(hb_frame) = hb_rx.recv() => {
                if let Err(e) = sink.send(hb_frame).await {
                    break Err(InboundError::WriteFailed(e.to_string()));
                }
            }
            frame = timeout(READ_DEADLINE, stream.next()) => {
                let Ok(frame) = frame else { break Err(InboundError::ReadTimeout) };
                let Some(frame) = frame else { break Err(InboundError::ReadFailed("stream closed".into())) };
                let msg = match frame {
                    Ok(m) => m,
                    Err(e) => break Err(InboundError::ReadFailed(e.to_string())),
                };
                match msg {
                    Message::Text(text) => {
                        let parsed: InboundFrame = match serde_json::from_str(&text) {
                            Ok(p) => p,
                            Err(e) => {
                                warn!(error = %e, "nextai-inbound: malformed frame, dropping");
                                continue;
                            }
                        };
                        if let Some(seq) = parsed.s {
                            last_seq.store(seq, Ordering::Relaxed);
                        }
                        match parsed.op {
                            OP_HELLO => {
                                let hello: HelloPayload = serde_json::from_value(parsed.d).unwrap_or(HelloPayload { heartbeat_interval: crate::opcode::DEFAULT_HEARTBEAT_INTERVAL_MS });
                                let identify = IdentifyFrame::new(format!("QQBot {token}"), intents);
                                if let Err(e) = sink.send(Message::Text(serde_json::to_string(&identify).unwrap())).await {
                                    break Err(InboundError::WriteFailed(e.to_string()));
                                }
                                let hb_seq = last_seq.clone();
                                let interval = Duration::from_millis(hello.heartbeat_interval);
                                let hb_tx = hb_tx.clone();
                                heartbeat_task = Some(tokio::spawn(async move {
                                    let mut ticker = tokio::time::interval(interval);
                                    loop {
                                        ticker.tick().await;
                                        let seq = hb_seq.load(Ordering::Relaxed);
                                        let frame = HeartbeatFrame::new(if seq == 0 { None } else { Some(seq) });
                                        let Ok(json) = serde_json::to_string(&frame) else { continue };
                                        if hb_tx.send(Message::Text(json)).is_err() {
                                            break;
                                        }
                                    }
                                }));
                            }
                            OP_DISPATCH => {
                                runtime
                                    .update(|s| {
                                        s.last_event_at = Some(Utc::now());
                                        s.last_event_type = parsed.t.clone();
                                    })
                                    .await;
                                if let Some(t) = parsed.t.as_deref() {
                                    if USER_MESSAGE_EVENTS.contains(&t) {
                                        dispatch_message_event(parsed.d, t, &engine).await;
                                    }
                                }
                            }
                            OP_RECONNECT => break Err(InboundError::Reconnect),
                            OP_INVALID_SESSION => break Err(InboundError::InvalidSession),
                            other => debug!(op = other, "nextai-inbound: ignoring unhandled opcode"),
                        }
                    }
                    Message::Close(_) => break Err(InboundError::ReadFailed("remote closed".into())),
                    _ => {}
                }
            }
        }
    };

    if let Some(h) = heartbeat_task {
        h.abort();
    }
    runtime.update(|s| s.connected = false).await;
    result
}

async fn dispatch_message_event(payload: Value, event_type: &str, engine: &Arc<Engine>) {
    let parsed: MessageDispatch = match serde_json::from_value(payload) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "nextai-inbound: failed to parse message dispatch");
            return;
        }
    };
    if parsed.author.bot {
        return;
    }
    let Some(text) = parsed.content.filter(|t| !t.trim().is_empty()) else {
        return;
    };
    let user_id = parsed
        .author
        .member_openid
        .or(parsed.author.union_openid)
        .or(parsed.author.id)
        .unwrap_or_default();
    let session_id = parsed.group_openid.or(parsed.channel_id).or(parsed.id).unwrap_or_else(|| user_id.clone());

    let req = AgentRequest {
        input: vec![AgentInputMessage::text(Role::User, text)],
        session_id,
        user_id,
        channel: "qq".to_string(),
        stream: false,
        biz_params: serde_json::json!({"qq": {"event": event_type}}),
        raw_body: serde_json::json!({}),
    };
    let mut sink = VecSink::default();
    if let Err(e) = engine.run_turn(req, &mut sink).await {
        warn!(error = %e, "nextai-inbound: agent turn failed for dispatched message");
    }
}
