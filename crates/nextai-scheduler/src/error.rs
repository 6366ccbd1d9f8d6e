// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Cron Scheduler / Executor error kinds (spec §4.F, §4.G, §7).

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("invalid schedule: {0}")]
    Invalid(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CronError {
    #[error("cron job '{0}' not found")]
    NotFound(String),
    #[error("the default system cron job cannot be deleted")]
    DefaultProtected,
    #[error("max_concurrency limit reached ({0})")]
    MaxConcurrencyReached(u32),
    #[error("{0}")]
    Other(String),
}

impl CronError {
    /// The `{error:{code}}` snake_case identifier (§7).
    pub fn code(&self) -> &'static str {
        match self {
            CronError::NotFound(_) => "not_found",
            CronError::DefaultProtected => "default_cron_protected",
            CronError::MaxConcurrencyReached(_) => "cron_busy",
            CronError::Other(_) => "runner_error",
        }
    }
}
