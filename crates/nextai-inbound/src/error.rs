// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Inbound Supervisor error kinds (spec §4.H).

#[derive(Debug, thiserror::Error)]
pub enum InboundError {
    #[error("token request failed: {0}")]
    TokenRequestFailed(String),
    #[error("gateway url request failed: {0}")]
    GatewayUrlFailed(String),
    #[error("websocket dial failed: {0}")]
    DialFailed(String),
    #[error("websocket read failed: {0}")]
    ReadFailed(String),
    #[error("websocket write failed: {0}")]
    WriteFailed(String),
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("session received Reconnect")]
    Reconnect,
    /// Sentinel for op `InvalidSession` (9) — the outer loop inspects this
    /// variant specifically to decide whether to fall back to a narrower
    /// intents bitmask (spec §4.H: "errQQInboundInvalidSession").
    #[error("session received InvalidSession")]
    InvalidSession,
    #[error("session read deadline exceeded")]
    ReadTimeout,
}
