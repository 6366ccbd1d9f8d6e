// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::channel::{deep_merge, Channel};
use crate::error::ChannelError;

/// Name→channel dispatcher map (spec §4.D).
pub struct ChannelRegistry {
    channels: HashMap<String, Arc<dyn Channel>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
        }
    }

    pub fn register(&mut self, channel: impl Channel + 'static) {
        self.channels.insert(channel.name().to_string(), Arc::new(channel));
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.keys().cloned().collect();
        names.sort();
        names
    }

    /// `Resolve(name)` (spec §4.D): lowercases `name`, applies the
    /// default-enablement rule against `stored_config`.
    pub fn resolve(&self, name: &str, stored_config: &Value) -> Result<Arc<dyn Channel>, ChannelError> {
        if name.trim().is_empty() {
            return Err(ChannelError::InvalidChannel);
        }
        let key = name.to_lowercase();
        let channel = self
            .channels
            .get(&key)
            .ok_or_else(|| ChannelError::NotSupported(key.clone()))?;

        let enabled = stored_config
            .get("enabled")
            .and_then(Value::as_bool)
            .unwrap_or_else(|| channel.enabled_by_default());
        if !enabled {
            return Err(ChannelError::Disabled(key));
        }
        Ok(channel.clone())
    }

    /// Resolves `name` and dispatches, merging `stored_config` with
    /// `overrides` (request fields win) before calling `send_text`.
    pub async fn send_text(
        &self,
        name: &str,
        user_id: &str,
        session_id: &str,
        text: &str,
        stored_config: &Value,
        overrides: &Value,
    ) -> Result<(), ChannelError> {
        let channel = self.resolve(name, stored_config)?;
        let mut cfg = stored_config.clone();
        deep_merge(&mut cfg, overrides);
        channel.send_text(user_id, session_id, text, &cfg).await
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    use super::*;

    struct RecordingChannel {
        name: &'static str,
        default_enabled: bool,
        sent: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        fn name(&self) -> &str {
            self.name
        }
        fn enabled_by_default(&self) -> bool {
            self.default_enabled
        }
        async fn send_text(
            &self,
            user_id: &str,
            session_id: &str,
            text: &str,
            _cfg: &Value,
        ) -> Result<(), ChannelError> {
            self.sent
                .lock()
                .unwrap()
                .push((user_id.to_string(), session_id.to_string(), text.to_string()));
            Ok(())
        }
    }

    #[test]
    fn empty_name_is_invalid_channel() {
        let reg = ChannelRegistry::new();
        let err = reg.resolve("", &json!({})).unwrap_err();
        assert!(matches!(err, ChannelError::InvalidChannel));
    }

    #[test]
    fn unknown_name_is_not_supported() {
        let reg = ChannelRegistry::new();
        let err = reg.resolve("slack", &json!({})).unwrap_err();
        assert!(matches!(err, ChannelError::NotSupported(_)));
    }

    #[test]
    fn console_is_enabled_by_default() {
        let mut reg = ChannelRegistry::new();
        reg.register(RecordingChannel {
            name: "console",
            default_enabled: true,
            sent: Mutex::new(Vec::new()),
        });
        assert!(reg.resolve("console", &json!({})).is_ok());
        assert!(reg.resolve("CONSOLE", &json!({})).is_ok());
    }

    #[test]
    fn non_console_requires_explicit_enablement() {
        let mut reg = ChannelRegistry::new();
        reg.register(RecordingChannel {
            name: "webhook",
            default_enabled: false,
            sent: Mutex::new(Vec::new()),
        });
        let err = reg.resolve("webhook", &json!({})).unwrap_err();
        assert!(matches!(err, ChannelError::Disabled(_)));
        assert!(reg.resolve("webhook", &json!({"enabled": true})).is_ok());
    }

    #[tokio::test]
    async fn send_text_merges_overrides_over_stored_config() {
        let mut reg = ChannelRegistry::new();
        reg.register(RecordingChannel {
            name: "console",
            default_enabled: true,
            sent: Mutex::new(Vec::new()),
        });
        reg.send_text("console", "u1", "s1", "hi", &json!({}), &json!({"target": "x"}))
            .await
            .unwrap();
    }
}
