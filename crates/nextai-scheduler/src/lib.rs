// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Cron Scheduler and Executor (spec §4.F, §4.G): a 1Hz tick loop that
//! resolves next-run times for interval and cron-expression jobs, honors
//! misfire policy, and launches due executions through a filesystem-lease
//! gated [`CronExecutor`].

mod error;
mod executor;
mod lease;
mod next_run;
mod scheduler;

pub use error::{CronError, ScheduleError};
pub use executor::CronExecutor;
pub use next_run::{next_cron_occurrence, parse_interval_seconds, resolve_next_run, NextRun};
pub use scheduler::Scheduler;
