// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The gateway's numbered opcodes and wire frames (spec §4.H).

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const OP_DISPATCH: u8 = 0;
pub const OP_HEARTBEAT: u8 = 1;
pub const OP_IDENTIFY: u8 = 2;
pub const OP_RECONNECT: u8 = 7;
pub const OP_INVALID_SESSION: u8 = 9;
pub const OP_HELLO: u8 = 10;

/// Safe fallback bitmask used when intents were never explicitly
/// configured and the gateway rejects the session (spec §4.H "Intent
/// fallback"). Public channel/c2c message intents only, no privileged bits.
pub const FALLBACK_INTENTS: u32 = 1 << 25 | 1 << 30;

/// Default heartbeat interval (ms) used if `Hello` omits one, per spec.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 45_000;

/// The event names that carry a user message (spec §4.H step 6).
pub const USER_MESSAGE_EVENTS: &[&str] = &["C2C_MESSAGE_CREATE", "GROUP_AT_MESSAGE_CREATE", "AT_MESSAGE_CREATE", "DIRECT_MESSAGE_CREATE"];

#[derive(Debug, Deserialize)]
pub struct InboundFrame {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HelloPayload {
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,
}

fn default_heartbeat_interval() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_MS
}

#[derive(Debug, Serialize)]
pub struct IdentifyFrame {
    pub op: u8,
    pub d: IdentifyPayload,
}

#[derive(Debug, Serialize)]
pub struct IdentifyPayload {pub token: String, pub intents: u32, pub shard: [u32; 2]}

impl IdentifyFrame {
    pub fn new(token: String, intents: u32) -> Self {
        Self { op: OP_IDENTIFY, d: IdentifyPayload { token, intents, shard: [0, 1] } }
    }
}

#[derive(Debug, Serialize)]
pub struct HeartbeatFrame {
    pub op: u8,
    pub d: Option<u64>,
}

impl HeartbeatFrame {
    pub fn new(last_seq: Option<u64>) -> Self {
        Self { op: OP_HEARTBEAT, d: last_seq }
    }
}

/// The shape of a user-message dispatch event's `d` payload, trimmed to
/// the fields the engine needs.
#[derive(Debug, Deserialize)]
pub struct MessageDispatch {
    pub content: Option<String>,
    #[serde(default)]
    pub author: Author,
    pub channel_id: Option<String>,
    pub group_openid: Option<String>,
    pub id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Author {
    #[serde(default)]
    pub bot: bool,
    pub id: Option<String>,
    pub member_openid: Option<String>,
    pub union_openid: Option<String>,
}
