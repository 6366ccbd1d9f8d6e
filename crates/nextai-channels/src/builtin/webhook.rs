// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The `webhook` channel: POSTs `{user_id, session_id, text}` to a
//! per-config URL. Disabled unless `cfg.enabled == true` (spec §4.D).

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::channel::Channel;
use crate::error::ChannelError;

pub struct WebhookChannel;

#[async_trait]
impl Channel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send_text(
        &self,
        user_id: &str,
        session_id: &str,
        text: &str,
        cfg: &Value,
    ) -> Result<(), ChannelError> {
        let url = cfg
            .get("webhook_url")
            .and_then(Value::as_str)
            .ok_or_else(|| ChannelError::DispatchFailed("webhook channel config missing 'webhook_url'".into()))?;

        debug!(url, "webhook: dispatching");

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| ChannelError::DispatchFailed(e.to_string()))?;

        let body = json!({ "user_id": user_id, "session_id": session_id, "text": text });
        let resp = client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::DispatchFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ChannelError::DispatchFailed(format!(
                "webhook returned status {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn missing_webhook_url_is_dispatch_failed() {
        let c = WebhookChannel;
        let err = c.send_text("u1", "s1", "hi", &json!({})).await.unwrap_err();
        assert!(matches!(err, ChannelError::DispatchFailed(_)));
    }

    #[test]
    fn not_enabled_by_default() {
        assert!(!WebhookChannel.enabled_by_default());
    }
}
