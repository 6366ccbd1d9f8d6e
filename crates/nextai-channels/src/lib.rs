// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Channel Registry (spec §4.D): name→channel dispatcher map with an
//! enabled/disabled policy sourced from stored config.

mod builtin;
mod channel;
mod error;
mod registry;

pub use builtin::{ConsoleChannel, QqChannel, WebhookChannel};
pub use channel::{deep_merge, Channel};
pub use error::ChannelError;
pub use registry::ChannelRegistry;

/// Builds the registry the gateway wires into the Agent Turn Engine and
/// Cron Executor: `console`, `webhook`, `qq`.
pub fn default_registry() -> ChannelRegistry {
    let mut registry = ChannelRegistry::new();
    registry.register(ConsoleChannel);
    registry.register(WebhookChannel);
    registry.register(QqChannel);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_all_built_in_channels() {
        let registry = default_registry();
        assert_eq!(registry.names(), vec!["console", "qq", "webhook"]);
    }
}
