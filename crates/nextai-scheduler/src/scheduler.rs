// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The 1Hz cron tick loop (spec §4.F): one read snapshot per tick, next-run
//! computation for every job, a single batched write if anything changed,
//! then asynchronous launch of due executions.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use nextai_config::CronJobState;
use nextai_store::{warn_on_store_error, Store};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::debug;

use crate::executor::{log_execution_failure, CronExecutor};
use crate::next_run::resolve_next_run;

pub struct Scheduler {
    store: Arc<Store>,
    executor: Arc<CronExecutor>,
}

impl Scheduler {
    pub fn new(store: Arc<Store>, executor: Arc<CronExecutor>) -> Self {
        Self { store, executor }
    }

    /// Runs the tick loop until `shutdown` is set to `true`, draining any
    /// in-flight job executions before returning (spec §4.F: "coordinated
    /// by the scheduler's wait group so shutdown drains them").
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let due = self.tick(Utc::now()).await;
                    for job_id in due {
                        let executor = self.executor.clone();
                        in_flight.spawn(async move {
                            if let Err(e) = executor.run(&job_id).await {
                                log_execution_failure(&job_id, &e);
                            }
                        });
                    }
                    while in_flight.try_join_next().is_some() {}
                }
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        debug!(pending = in_flight.len(), "cron scheduler shutting down, draining in-flight executions");
        while in_flight.join_next().await.is_some() {}
    }

    /// One tick: resolves next-runs for every job against a single
    /// snapshot, persists only the jobs whose state actually changed, and
    /// returns the ids due for execution this tick.
    async fn tick(&self, now: chrono::DateTime<Utc>) -> Vec<String> {
        let snapshot = self.store.read(|s| s.clone()).await;
        let mut updates: Vec<(String, CronJobState)> = Vec::new();
        let mut due_jobs = Vec::new();

        let mut job_ids: Vec<String> = snapshot.cron_specs.keys().cloned().collect();
        job_ids.sort();

        for job_id in job_ids {
            let spec = &snapshot.cron_specs[&job_id];
            let before = snapshot.cron_states.get(&job_id).cloned().unwrap_or_default();
            let mut state = before.clone();
            state.normalize();

            if !spec.enabled || state.paused {
                state.next_run_at = None;
            } else {
                match resolve_next_run(spec, state.next_run_at, now) {
                    Ok(result) => {
                        state.next_run_at = result.next_run_at;
                        if let Some(due_at) = result.due_at {
                            let grace = spec.runtime.misfire_grace_seconds;
                            let late_seconds = now.signed_duration_since(due_at).num_seconds();
                            if grace > 0 && late_seconds > grace as i64 {
                                state.last_status = Some(nextai_config::CronRunStatus::Failed);
                                state.last_error =
                                    Some(format!("misfire skipped: scheduled_at={}", due_at.to_rfc3339()));
                            } else {
                                due_jobs.push(job_id.clone());
                            }
                        }
                    }
                    Err(e) => {
                        state.last_error = Some(e.to_string());
                        state.next_run_at = None;
                    }
                }
            }

            if state != before {
                updates.push((job_id, state));
            }
        }

        if !updates.is_empty() {
            let result = self
                .store
                .write::<std::convert::Infallible>(|s| {
                    for (job_id, state) in updates {
                        s.cron_states.insert(job_id, state);
                    }
                    Ok(())
                })
                .await;
            warn_on_store_error(&result);
        }

        due_jobs
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use nextai_config::{
        CronDispatch, CronJobSpec, CronRuntime, CronSchedule, DispatchTarget, ScheduleType, TaskType,
    };
    use nextai_model::GatewayRunner;
    use nextai_tools::ToolRegistry;

    use super::*;
    use crate::executor::CronExecutor;

    async fn make_scheduler(data_dir: &std::path::Path) -> Scheduler {
        let store = Arc::new(Store::open(data_dir).await.unwrap());
        let channels = Arc::new(nextai_channels::default_registry());
        let tools = Arc::new(ToolRegistry::new());
        let runner = Arc::new(GatewayRunner::new());
        let engine = Arc::new(nextai_core::Engine::new(store.clone(), runner, tools, channels.clone()));
        let executor = Arc::new(CronExecutor::new(store.clone(), channels, engine));
        Scheduler::new(store, executor)
    }

    fn interval_job(id: &str, cron: &str) -> CronJobSpec {
        CronJobSpec {
            id: id.into(),
            name: id.into(),
            enabled: true,
            schedule: CronSchedule { kind: ScheduleType::Interval, cron: cron.into(), timezone: None },
            task_type: TaskType::Text,
            text: Some("hi".into()),
            workflow: None,
            dispatch: CronDispatch {
                channel: "console".into(),
                target: DispatchTarget::default(),
                extra: HashMap::new(),
            },
            runtime: CronRuntime::default(),
            meta: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn disabled_job_clears_next_run_at() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = make_scheduler(dir.path()).await;
        let mut job = interval_job("j1", "60s");
        job.enabled = false;
        scheduler
            .store
            .write::<std::convert::Infallible>(|s| {
                s.cron_specs.insert(job.id.clone(), job.clone());
                s.cron_states
                    .insert(job.id.clone(), CronJobState { next_run_at: Some(Utc::now()), ..Default::default() });
                Ok(())
            })
            .await
            .unwrap();

        scheduler.tick(Utc::now()).await;

        let state = scheduler.store.read(|s| s.cron_states.get("j1").cloned()).await.unwrap();
        assert!(state.next_run_at.is_none());
    }

    #[tokio::test]
    async fn paused_job_clears_next_run_at_and_is_never_due() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = make_scheduler(dir.path()).await;
        let job = interval_job("j1", "1s");
        scheduler
            .store
            .write::<std::convert::Infallible>(|s| {
                s.cron_specs.insert(job.id.clone(), job.clone());
                s.cron_states.insert(
                    job.id.clone(),
                    CronJobState { next_run_at: Some(Utc::now() - chrono::Duration::seconds(5)), paused: true, ..Default::default() },
                );
                Ok(())
            })
            .await
            .unwrap();

        let due = scheduler.tick(Utc::now()).await;
        assert!(due.is_empty());
        let state = scheduler.store.read(|s| s.cron_states.get("j1").cloned()).await.unwrap();
        assert!(state.next_run_at.is_none());
    }

    #[tokio::test]
    async fn past_due_interval_job_is_enqueued() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = make_scheduler(dir.path()).await;
        let job = interval_job("j1", "1s");
        scheduler
            .store
            .write::<std::convert::Infallible>(|s| {
                s.cron_specs.insert(job.id.clone(), job.clone());
                s.cron_states.insert(
                    job.id.clone(),
                    CronJobState { next_run_at: Some(Utc::now() - chrono::Duration::seconds(1)), ..Default::default() },
                );
                Ok(())
            })
            .await
            .unwrap();

        let due = scheduler.tick(Utc::now()).await;
        assert_eq!(due, vec!["j1".to_string()]);
    }

    #[tokio::test]
    async fn misfire_beyond_grace_is_skipped_not_enqueued() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = make_scheduler(dir.path()).await;
        let mut job = interval_job("j1", "1s");
        job.runtime.misfire_grace_seconds = 1;
        scheduler
            .store
            .write::<std::convert::Infallible>(|s| {
                s.cron_specs.insert(job.id.clone(), job.clone());
                s.cron_states.insert(
                    job.id.clone(),
                    CronJobState { next_run_at: Some(Utc::now() - chrono::Duration::seconds(15)), ..Default::default() },
                );
                Ok(())
            })
            .await
            .unwrap();

        let due = scheduler.tick(Utc::now()).await;
        assert!(due.is_empty());

        let state = scheduler.store.read(|s| s.cron_states.get("j1").cloned()).await.unwrap();
        assert_eq!(state.last_status, Some(nextai_config::CronRunStatus::Failed));
        assert!(state.last_error.as_ref().unwrap().starts_with("misfire skipped"));
        assert!(state.last_run_at.is_none());
    }

    #[tokio::test]
    async fn tick_is_a_no_op_when_nothing_changed() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = make_scheduler(dir.path()).await;
        let job = interval_job("j1", "60s");
        let future = Utc::now() + chrono::Duration::seconds(30);
        scheduler
            .store
            .write::<std::convert::Infallible>(|s| {
                s.cron_specs.insert(job.id.clone(), job.clone());
                s.cron_states.insert(job.id.clone(), CronJobState { next_run_at: Some(future), ..Default::default() });
                Ok(())
            })
            .await
            .unwrap();

        let due = scheduler.tick(Utc::now()).await;
        assert!(due.is_empty());
        let state = scheduler.store.read(|s| s.cron_states.get("j1").cloned()).await.unwrap();
        assert_eq!(state.next_run_at, Some(future));
    }
}
