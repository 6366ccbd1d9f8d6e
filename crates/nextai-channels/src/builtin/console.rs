// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The `console` channel: enabled unless explicitly disabled (spec §4.D),
//! used as the built-in fallback and as the default target for cron jobs
//! without an overriding dispatch target.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::channel::Channel;
use crate::error::ChannelError;

pub struct ConsoleChannel;

#[async_trait]
impl Channel for ConsoleChannel {
    fn name(&self) -> &str {
        "console"
    }

    fn enabled_by_default(&self) -> bool {
        true
    }

    async fn send_text(
        &self,
        user_id: &str,
        session_id: &str,
        text: &str,
        _cfg: &Value,
    ) -> Result<(), ChannelError> {
        info!(user_id, session_id, "console: {text}");
        Ok(())
    }
}
