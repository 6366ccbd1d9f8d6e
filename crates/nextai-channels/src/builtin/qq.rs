// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The `qq` channel: the external chat gateway the Inbound Supervisor
//! (spec §4.H) dispatches *into* the Agent Turn Engine from. It never
//! accepts outbound sends — the Cron Executor special-cases it before even
//! reaching `Channel.SendText` (spec §4.G step 4), and this impl mirrors
//! that refusal so any other caller gets the same, stable error.

use async_trait::async_trait;
use serde_json::Value;

use crate::channel::Channel;
use crate::error::ChannelError;

pub struct QqChannel;

#[async_trait]
impl Channel for QqChannel {
    fn name(&self) -> &str {
        "qq"
    }

    async fn send_text(
        &self,
        _user_id: &str,
        _session_id: &str,
        _text: &str,
        _cfg: &Value,
    ) -> Result<(), ChannelError> {
        Err(ChannelError::DispatchFailed("qq channel is inbound-only".into()))
    }
}
