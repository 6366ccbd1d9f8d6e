// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Next-run computation for interval and cron-expression schedules (spec
//! §4.F), timezone-aware via `chrono-tz` the way
//! `examples/sblanchard-SerialAgent`'s gateway resolves IANA names for its
//! own cron evaluator — generalized here onto the already-adopted `cron`
//! crate, whose `Schedule` is generic over `chrono::TimeZone` and so
//! natively accepts a `chrono_tz::Tz`, instead of hand-rolling a matcher.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use nextai_config::{CronJobSpec, ScheduleType};

use crate::error::ScheduleError;

/// Outcome of resolving one job's next run against `now` (spec §4.F):
/// the (possibly advanced) `next_run_at` to persist, and the instant that
/// was due this tick, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct NextRun {
    pub next_run_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
}

/// Resolves a job's next run from its previous `next_run_at` (spec §4.F):
/// keeps a still-future instant as-is; if it is in the past, that instant
/// becomes `due_at` and the cursor advances until strictly greater than
/// `now`; with no previous instant, computes fresh from `now` with nothing
/// due yet.
pub fn resolve_next_run(
    spec: &CronJobSpec,
    previous_next_run_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<NextRun, ScheduleError> {
    match previous_next_run_at {
        Some(prev) if prev > now => Ok(NextRun { next_run_at: Some(prev), due_at: None }),
        Some(prev) => {
            let mut cursor = prev;
            loop {
                cursor = compute_single_next(spec, cursor)?;
                if cursor > now {
                    break;
                }
            }
            Ok(NextRun { next_run_at: Some(cursor), due_at: Some(prev) })
        }
        None => {
            let next = compute_single_next(spec, now)?;
            Ok(NextRun { next_run_at: Some(next), due_at: None })
        }
    }
}

fn compute_single_next(spec: &CronJobSpec, after: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
    match spec.schedule.kind {
        ScheduleType::Interval => {
            let secs = parse_interval_seconds(&spec.schedule.cron)?;
            Ok(after + chrono::Duration::seconds(secs as i64))
        }
        ScheduleType::Cron => {
            next_cron_occurrence(&spec.schedule.cron, spec.schedule.timezone.as_deref(), after)
        }
    }
}

/// Parses an interval `cron` field: a bare positive integer is seconds,
/// otherwise a `humantime` duration string (`"60s"`, `"2m"`, ...).
pub fn parse_interval_seconds(raw: &str) -> Result<u64, ScheduleError> {
    let trimmed = raw.trim();
    if let Ok(n) = trimmed.parse::<u64>() {
        return if n == 0 {
            Err(ScheduleError::Invalid("interval must be a positive duration".into()))
        } else {
            Ok(n)
        };
    }
    humantime::parse_duration(trimmed)
        .map(|d| d.as_secs().max(1))
        .map_err(|e| ScheduleError::Invalid(format!("invalid interval '{raw}': {e}")))
}

/// A handful of standard cron descriptor aliases (spec §4.F: "descriptor
/// aliases"), expanded to the 6-field `sec min hour dom month dow` form the
/// `cron` crate expects before parsing.
fn expand_descriptor(expr: &str) -> Option<&'static str> {
    match expr.trim() {
        "@yearly" | "@annually" => Some("0 0 0 1 1 *"),
        "@monthly" => Some("0 0 0 1 * *"),
        "@weekly" => Some("0 0 0 * * 0"),
        "@daily" | "@midnight" => Some("0 0 0 * * *"),
        "@hourly" => Some("0 0 * * * *"),
        _ => None,
    }
}

/// Normalizes a 5-field standard-cron expression (`min hour dom month dow`,
/// no seconds) to the 6-field form the `cron` crate requires by prepending
/// a `0` seconds field; 6-field expressions and descriptors pass through.
fn normalize_cron_expr(expr: &str) -> String {
    if let Some(expanded) = expand_descriptor(expr) {
        return expanded.to_string();
    }
    let trimmed = expr.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    }
}

fn parse_timezone(tz: Option<&str>) -> chrono_tz::Tz {
    tz.and_then(|s| chrono_tz::Tz::from_str(s).ok()).unwrap_or(chrono_tz::UTC)
}

/// The next occurrence of `expr` (5- or 6-field, with optional seconds and
/// the descriptor aliases above) strictly after `after`, interpreted in
/// `timezone` (default UTC) and converted back to UTC (spec §4.F). DST
/// gaps/overlaps are resolved by `cron`/`chrono-tz` themselves: an
/// ambiguous local time resolves to its earlier (pre-transition) instant,
/// a nonexistent local time is simply never produced as a candidate.
pub fn next_cron_occurrence(
    expr: &str,
    timezone: Option<&str>,
    after: DateTime<Utc>,
) -> Result<DateTime<Utc>, ScheduleError> {
    let normalized = normalize_cron_expr(expr);
    let schedule = cron::Schedule::from_str(&normalized)
        .map_err(|e| ScheduleError::Invalid(format!("invalid cron expression '{expr}': {e}")))?;
    let tz = parse_timezone(timezone);
    let local_after = after.with_timezone(&tz);
    schedule
        .after(&local_after)
        .next()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| ScheduleError::Invalid(format!("cron expression '{expr}' has no future occurrence")))
}
