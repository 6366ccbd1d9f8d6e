// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Inbound Supervisor (spec §4.H): the websocket worker for the one
//! external chat gateway this gateway dispatches *into* the Agent Turn
//! Engine from, plus the config-signature reconciliation loop that
//! starts/stops it as the `qq` channel config changes.

mod error;
mod opcode;
mod session;
mod state;
mod supervisor;

pub use error::InboundError;
pub use session::QqConfig;
pub use state::{InboundStateHandle, IntentsSource, RuntimeInboundState};
pub use supervisor::Supervisor;
