// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The channel trait every outbound dispatcher implements (spec §4.D).

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ChannelError;

/// Capability-based port (spec §9): `{SendText}` only, no class hierarchy.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;
    /// Whether this channel is enabled absent any stored config (spec §4.D
    /// default enablement rule). Only `console` answers `true`.
    fn enabled_by_default(&self) -> bool {
        false
    }
    async fn send_text(
        &self,
        user_id: &str,
        session_id: &str,
        text: &str,
        cfg: &Value,
    ) -> Result<(), ChannelError>;
}

/// Deep-merges `src` into `dst`, `src`'s scalar values winning over `dst`'s
/// (spec §4.D: "per-request overrides... with request fields taking
/// precedence"). Grounded on the layered-config merge in
/// `nextai-config::loader`.
pub fn deep_merge(dst: &mut Value, src: &Value) {
    match (dst, src) {
        (Value::Object(d), Value::Object(s)) => {
            for (k, v) in s {
                match d.get_mut(k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        d.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (dst, src) => {
            if !src.is_null() {
                *dst = src.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deep_merge_overrides_scalars() {
        let mut dst = json!({"enabled": false, "webhook_url": "https://a"});
        let src = json!({"enabled": true});
        deep_merge(&mut dst, &src);
        assert_eq!(dst, json!({"enabled": true, "webhook_url": "https://a"}));
    }

    #[test]
    fn deep_merge_recurses_into_nested_objects() {
        let mut dst = json!({"target": {"user_id": "u1", "session_id": "s1"}});
        let src = json!({"target": {"session_id": "s2"}});
        deep_merge(&mut dst, &src);
        assert_eq!(dst, json!({"target": {"user_id": "u1", "session_id": "s2"}}));
    }

    #[test]
    fn deep_merge_ignores_null_overrides() {
        let mut dst = json!({"enabled": true});
        let src = json!({"enabled": null});
        deep_merge(&mut dst, &src);
        assert_eq!(dst, json!({"enabled": true}));
    }
}
