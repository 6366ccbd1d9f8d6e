// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Runtime inbound state (spec §4.H, §5): a small, hot-path struct behind
//! its own reader-writer lock, distinct from the main `Store`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

/// Where the current intents bitmask came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentsSource {
    Configured,
    Default,
    Fallback,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuntimeInboundState {
    pub running: bool,
    pub connected: bool,
    pub active_signature: String,
    pub intents: u32,
    pub intents_source: IntentsSource,
    pub gateway_url: Option<String>,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub last_event_at: Option<DateTime<Utc>>,
    pub last_event_type: Option<String>,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
}

impl Default for RuntimeInboundState {
    fn default() -> Self {
        Self {
            running: false,
            connected: false,
            active_signature: String::new(),
            intents: 0,
            intents_source: IntentsSource::Default,
            gateway_url: None,
            last_connected_at: None,
            last_event_at: None,
            last_event_type: None,
            last_error: None,
            last_error_at: None,
        }
    }
}

/// Shared handle read by the `GET /cron/.../state`-style status endpoint
/// and written by the supervisor loop.
#[derive(Clone)]
pub struct InboundStateHandle(Arc<RwLock<RuntimeInboundState>>);

impl InboundStateHandle {
    pub fn new() -> Self {
        Self(Arc::new(RwLock::new(RuntimeInboundState::default())))
    }

    pub async fn snapshot(&self) -> RuntimeInboundState {
        self.0.read().await.clone()
    }

    pub async fn update(&self, f: impl FnOnce(&mut RuntimeInboundState)) {
        let mut guard = self.0.write().await;
        f(&mut guard);
    }
}

impl Default for InboundStateHandle {
    fn default() -> Self {
        Self::new()
    }
}
