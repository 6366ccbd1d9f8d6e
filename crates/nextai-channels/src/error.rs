// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Channel Registry error kinds (spec §4.D, mapped to HTTP by §7).

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("invalid channel name")]
    InvalidChannel,
    #[error("channel '{0}' is not supported")]
    NotSupported(String),
    #[error("channel '{0}' is disabled")]
    Disabled(String),
    #[error("channel dispatch failed: {0}")]
    DispatchFailed(String),
}
