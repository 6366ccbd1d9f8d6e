// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// Bootstrap configuration: the handful of process-level settings the
/// gateway needs before it can open its state file. Loaded once at startup
/// via [`crate::loader::load`]; everything that changes at runtime (chats,
/// providers, cron jobs, channels, skills) lives in [`crate::state::State`]
/// instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Directory holding the persisted state file and the cron-lease tree.
    pub data_dir: String,
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_level: String,
    /// HTTP bind address for the axum server.
    pub bind_addr: String,
    /// Shared API key checked by the (out-of-scope) HTTP auth middleware.
    /// Kept here only so it round-trips through config layering; the core
    /// never reads it.
    pub api_key: Option<String>,
    /// Gate for `GET /agent/system-layers` (§6).
    pub system_layers_endpoint_enabled: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: "info".to_string(),
            bind_addr: "127.0.0.1:8080".to_string(),
            api_key: None,
            system_layers_endpoint_enabled: true,
        }
    }
}

fn default_data_dir() -> String {
    dirs::data_dir()
        .map(|d| d.join("nextai").to_string_lossy().to_string())
        .unwrap_or_else(|| ".nextai-data".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_round_trips_through_yaml() {
        let cfg = GatewayConfig::default();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let back: GatewayConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.bind_addr, cfg.bind_addr);
        assert_eq!(back.log_level, cfg.log_level);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let cfg: GatewayConfig = serde_yaml::from_str("log_level: trace").unwrap();
        assert_eq!(cfg.log_level, "trace");
        assert_eq!(cfg.bind_addr, GatewayConfig::default().bind_addr);
    }
}
