// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The Inbound Supervisor reconciliation loop (spec §4.H): polls the
//! State Store for the `qq` channel config every 5 s, and owns the
//! lifecycle of (at most) one session worker whose identity tracks the
//! config signature.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use nextai_core::Engine;
use nextai_store::Store;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::InboundError;
use crate::opcode::FALLBACK_INTENTS;
use crate::session::{self, QqConfig};
use crate::state::{InboundStateHandle, IntentsSource};

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Broad default intents used when the operator hasn't set `intents`
/// explicitly: public/group/at message events only.
const DEFAULT_INTENTS: u32 = (1 << 25) | (1 << 30) | (1 << 1);

pub struct Supervisor {
    store: Arc<Store>,
    engine: Arc<Engine>,
    state: InboundStateHandle,
}

impl Supervisor {
    pub fn new(store: Arc<Store>, engine: Arc<Engine>) -> Self {
        Self { store, engine, state: InboundStateHandle::new() }
    }

    pub fn state_handle(&self) -> InboundStateHandle {
        self.state.clone()
    }

    /// Runs until `shutdown` is set, reconciling the active worker against
    /// the store's `qq` channel config every 5 s.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        self.state.update(|s| s.running = true).await;
        let mut poll = tokio::time::interval(POLL_INTERVAL);
        let mut active: Option<(String, tokio::task::JoinHandle<()>, watch::Sender<bool>)> = None;

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    let desired = self.read_config().await;
                    let desired_sig = desired.as_ref().map(|c| c.signature()).unwrap_or_default();
                    let current_sig = active.as_ref().map(|(sig, _, _)| sig.clone()).unwrap_or_default();
                    if desired_sig != current_sig {
                        if let Some((_, handle, tx)) = active.take() {
                            let _ = tx.send(true);
                            handle.abort();
                        }
                        if let Some(cfg) = desired {
                            info!("nextai-inbound: config signature changed, starting session worker");
                            let (tx, rx) = watch::channel(false);
                            let engine = self.engine.clone();
                            let state = self.state.clone();
                            let configured_intents = self.configured_intents().await;
                            let handle = tokio::spawn(worker_loop(cfg, configured_intents, engine, state, rx));
                            active = Some((desired_sig, handle, tx));
                        } else {
                            self.state.update(|s| {
                                s.active_signature.clear();
                                s.connected = false;
                                s.gateway_url = None;
                            }).await;
                        }
                    }
                }
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if let Some((_, handle, tx)) = active.take() {
            let _ = tx.send(true);
            let _ = handle.await;
        }
        self.state.update(|s| s.running = false).await;
        debug!("nextai-inbound: supervisor shut down");
    }

    async fn read_config(&self) -> Option<QqConfig> {
        let value = self.store.read(|s| s.channels.get("qq").cloned()).await?;
        QqConfig::from_value(&value)
    }

    async fn configured_intents(&self) -> Option<u32> {
        let value = self.store.read(|s| s.channels.get("qq").cloned()).await?;
        value.get("intents").and_then(serde_json::Value::as_u64).map(|v| v as u32)
    }
}

async fn worker_loop(
    cfg: QqConfig,
    configured_intents: Option<u32>,
    engine: Arc<Engine>,
    state: InboundStateHandle,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut intents = configured_intents.unwrap_or(DEFAULT_INTENTS);
    let mut source = if configured_intents.is_some() { IntentsSource::Configured } else { IntentsSource::Default };
    let mut backoff = Duration::from_secs(1);

    state
        .update(|s| {
            s.intents = intents;
            s.intents_source = source;
            s.active_signature = cfg.signature();
        })
        .await;

    loop {
        if *shutdown.borrow() {
            break;
        }

        let token = match session::fetch_access_token(&cfg).await {
            Ok(t) => t,
            Err(e) => {
                record_error(&state, &e).await;
                if wait_or_shutdown(&mut shutdown, backoff).await {
                    break;
                }
                backoff = next_backoff(backoff);
                continue;
            }
        };

        let outcome = session::run_session(cfg.clone(), token, intents, engine.clone(), state.clone(), shutdown.clone()).await;

        match outcome {
            Ok(()) => break,
            Err(e @ (InboundError::Reconnect | InboundError::InvalidSession | InboundError::ReadTimeout)) => {
                backoff = Duration::from_secs(1);
                if matches!(e, InboundError::InvalidSession) && source != IntentsSource::Configured {
                    warn!("nextai-inbound: invalid session, falling back to narrower intents");
                    intents = FALLBACK_INTENTS;
                    source = IntentsSource::Fallback;
                    state
                        .update(|s| {
                            s.intents = intents;
                            s.intents_source = source;
                            s.last_error = Some("invalid session".into());
                            s.last_error_at = Some(Utc::now());
                        })
                        .await;
                    continue;
                }
                record_error(&state, &e).await;
                if wait_or_shutdown(&mut shutdown, backoff).await {
                    break;
                }
                backoff = next_backoff(backoff);
            }
            Err(e) => {
                record_error(&state, &e).await;
                if wait_or_shutdown(&mut shutdown, backoff).await {
                    break;
                }
                backoff = next_backoff(backoff);
            }
        }
    }
}

async fn record_error(state: &InboundStateHandle, err: &InboundError) {
    let msg = err.to_string();
    state
        .update(|s| {
            s.last_error = Some(msg);
            s.last_error_at = Some(Utc::now());
        })
        .await;
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

/// Sleeps for `d` unless `shutdown` flips true first; returns `true` if
/// shutdown was observed.
async fn wait_or_shutdown(shutdown: &mut watch::Receiver<bool>, d: Duration) -> bool {
    tokio::select! {
        _ = sleep(d) => false,
        result = shutdown.changed() => result.is_err() || *shutdown.borrow(),
    }
}
