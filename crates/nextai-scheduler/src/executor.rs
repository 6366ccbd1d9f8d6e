// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Cron Executor: single-job execution, whether triggered by the
//! scheduler's tick or an explicit "run now" request (spec §4.G).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use nextai_channels::ChannelRegistry;
use nextai_config::{AgentInputMessage, CronJobState, CronRunStatus, Role, TaskType};
use nextai_core::{AgentRequest, Engine, TurnOutcome, VecSink};
use nextai_store::{warn_on_store_error, Store};
use tracing::warn;

use crate::error::CronError;
use crate::lease;

pub struct CronExecutor {
    store: Arc<Store>,
    channels: Arc<ChannelRegistry>,
    engine: Arc<Engine>,
}

impl CronExecutor {
    pub fn new(store: Arc<Store>, channels: Arc<ChannelRegistry>, engine: Arc<Engine>) -> Self {
        Self { store, channels, engine }
    }

    /// Runs `job_id` to completion: slot acquisition, running status,
    /// context-timeout execution, terminal status, idempotent release.
    pub async fn run(&self, job_id: &str) -> Result<(), CronError> {
        let spec = self
            .store
            .read(|s| s.cron_specs.get(job_id).cloned())
            .await
            .ok_or_else(|| CronError::NotFound(job_id.to_string()))?;

        let leases_dir = self.store.cron_leases_dir();
        let lease = match lease::acquire(
            &leases_dir,
            job_id,
            spec.runtime.max_concurrency,
            spec.runtime.timeout_seconds,
        )
        .await
        {
            Some(l) => l,
            None => {
                let msg = format!("max_concurrency limit reached ({})", spec.runtime.max_concurrency);
                self.update_state(job_id, |st| {
                    st.last_status = Some(CronRunStatus::Failed);
                    st.last_error = Some(msg.clone());
                })
                .await;
                return Err(CronError::MaxConcurrencyReached(spec.runtime.max_concurrency));
            }
        };

        self.update_state(job_id, |st| {
            st.last_run_at = Some(Utc::now());
            st.last_status = Some(CronRunStatus::Running);
            st.last_error = None;
        })
        .await;

        let timeout = Duration::from_secs(spec.runtime.timeout_seconds.max(1) as u64);
        let outcome = match tokio::time::timeout(timeout, self.dispatch(&spec)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("cron execution timeout after {}s", spec.runtime.timeout_seconds)),
        };

        match &outcome {
            Ok(()) => {
                self.update_state(job_id, |st| {
                    st.last_status = Some(CronRunStatus::Succeeded);
                    st.last_error = None;
                })
                .await;
            }
            Err(msg) => {
                self.update_state(job_id, |st| {
                    st.last_status = Some(CronRunStatus::Failed);
                    st.last_error = Some(msg.clone());
                })
                .await;
            }
        }

        lease::release(&lease).await;
        outcome.map_err(CronError::Other)
    }

    async fn update_state(&self, job_id: &str, f: impl FnOnce(&mut CronJobState)) {
        let result = self
            .store
            .write::<std::convert::Infallible>(|state| {
                f(state.ensure_cron_state(job_id));
                Ok(())
            })
            .await;
        warn_on_store_error(&result);
    }

    /// Task-type dispatch (spec §4.G step 4): `text` routes to a channel
    /// (or, for `console`, through the Agent Turn Engine); `workflow` has
    /// no interpreter yet and always fails with a fixed message so its
    /// round-trip through persistence is exercised without pretending to
    /// run anything.
    async fn dispatch(&self, spec: &nextai_config::CronJobSpec) -> anyhow::Result<()> {
        match spec.task_type {
            TaskType::Text => self.dispatch_text(spec).await,
            TaskType::Workflow => anyhow::bail!("workflow execution is not implemented"),
        }
    }

    async fn dispatch_text(&self, spec: &nextai_config::CronJobSpec) -> anyhow::Result<()> {
        let Some(text) = spec.text.as_ref().filter(|t| !t.is_empty()) else {
            return Ok(());
        };

        let channel = if spec.dispatch.channel.trim().is_empty() {
            "console".to_string()
        } else {
            spec.dispatch.channel.trim().to_lowercase()
        };

        if channel == "qq" {
            anyhow::bail!("qq channel is inbound-only");
        }

        if channel == "console" {
            let req = AgentRequest {
                input: vec![AgentInputMessage::text(Role::User, text.clone())],
                session_id: spec.dispatch.target.session_id.clone(),
                user_id: spec.dispatch.target.user_id.clone(),
                channel: "console".to_string(),
                stream: false,
                biz_params: serde_json::json!({"cron": {"job_id": spec.id, "job_name": spec.name}}),
                raw_body: serde_json::json!({}),
            };
            let mut sink = VecSink::default();
            match self.engine.run_turn(req, &mut sink).await? {
                TurnOutcome::Completed { .. } | TurnOutcome::StreamedError => Ok(()),
            }
        } else {
            let cfg = self
                .store
                .read(|s| s.channels.get(&channel).cloned())
                .await
                .unwrap_or_else(|| serde_json::json!({}));
            self.channels
                .send_text(
                    &channel,
                    &spec.dispatch.target.user_id,
                    &spec.dispatch.target.session_id,
                    text,
                    &cfg,
                    &serde_json::json!({}),
                )
                .await
                .map_err(|e| anyhow::anyhow!(e))
        }
    }
}

pub(crate) fn log_execution_failure(job_id: &str, err: &CronError) {
    warn!(job_id, error = %err, "cron execution failed");
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use nextai_config::{CronDispatch, CronJobSpec, CronRuntime, CronSchedule, DispatchTarget, ScheduleType};
    use nextai_model::GatewayRunner;
    use nextai_tools::ToolRegistry;

    use super::*;

    async fn make_executor(data_dir: &std::path::Path) -> CronExecutor {
        let store = Arc::new(Store::open(data_dir).await.unwrap());
        let channels = Arc::new(nextai_channels::default_registry());
        let tools = Arc::new(ToolRegistry::new());
        let runner = Arc::new(GatewayRunner::new());
        let engine = Arc::new(Engine::new(store.clone(), runner, tools, channels.clone()));
        CronExecutor::new(store, channels, engine)
    }

    fn text_job(channel: &str, text: &str) -> CronJobSpec {
        CronJobSpec {
            id: "job-1".into(),
            name: "job-1".into(),
            enabled: true,
            schedule: CronSchedule { kind: ScheduleType::Interval, cron: "60s".into(), timezone: None },
            task_type: TaskType::Text,
            text: Some(text.into()),
            workflow: None,
            dispatch: CronDispatch {
                channel: channel.into(),
                target: DispatchTarget { user_id: "u1".into(), session_id: "s1".into() },
                extra: HashMap::new(),
            },
            runtime: CronRuntime { max_concurrency: 1, timeout_seconds: 5, misfire_grace_seconds: 0 },
            meta: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn missing_job_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let executor = make_executor(dir.path()).await;
        let err = executor.run("nope").await.unwrap_err();
        assert!(matches!(err, CronError::NotFound(_)));
    }

    #[tokio::test]
    async fn text_job_on_console_runs_through_engine_and_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let executor = make_executor(dir.path()).await;
        let spec = text_job("console", "hello from cron");
        executor
            .store
            .write::<std::convert::Infallible>(|s| {
                s.cron_specs.insert(spec.id.clone(), spec.clone());
                Ok(())
            })
            .await
            .unwrap();

        executor.run(&spec.id).await.unwrap();

        let state = executor.store.read(|s| s.cron_states.get(&spec.id).cloned()).await.unwrap();
        assert_eq!(state.last_status, Some(CronRunStatus::Succeeded));
        assert!(state.last_run_at.is_some());
    }

    #[tokio::test]
    async fn qq_dispatch_channel_fails_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let executor = make_executor(dir.path()).await;
        let spec = text_job("qq", "hi");
        executor
            .store
            .write::<std::convert::Infallible>(|s| {
                s.cron_specs.insert(spec.id.clone(), spec.clone());
                Ok(())
            })
            .await
            .unwrap();

        executor.run(&spec.id).await.unwrap_err();

        let state = executor.store.read(|s| s.cron_states.get(&spec.id).cloned()).await.unwrap();
        assert_eq!(state.last_status, Some(CronRunStatus::Failed));
        assert_eq!(state.last_error.as_deref(), Some("qq channel is inbound-only"));
    }

    #[tokio::test]
    async fn workflow_job_fails_with_fixed_message() {
        let dir = tempfile::tempdir().unwrap();
        let executor = make_executor(dir.path()).await;
        let mut spec = text_job("console", "unused");
        spec.task_type = TaskType::Workflow;
        spec.workflow = Some(serde_json::json!({"steps": []}));
        executor
            .store
            .write::<std::convert::Infallible>(|s| {
                s.cron_specs.insert(spec.id.clone(), spec.clone());
                Ok(())
            })
            .await
            .unwrap();

        executor.run(&spec.id).await.unwrap_err();

        let state = executor.store.read(|s| s.cron_states.get(&spec.id).cloned()).await.unwrap();
        assert_eq!(state.last_status, Some(CronRunStatus::Failed));
        assert_eq!(state.last_error.as_deref(), Some("workflow execution is not implemented"));
    }

    #[tokio::test]
    async fn exhausted_slots_return_max_concurrency_error() {
        let dir = tempfile::tempdir().unwrap();
        let executor = make_executor(dir.path()).await;
        let mut spec = text_job("console", "hi");
        spec.runtime.max_concurrency = 1;
        executor
            .store
            .write::<std::convert::Infallible>(|s| {
                s.cron_specs.insert(spec.id.clone(), spec.clone());
                Ok(())
            })
            .await
            .unwrap();

        let leases_dir = executor.store.cron_leases_dir();
        let held = lease::acquire(&leases_dir, &spec.id, 1, spec.runtime.timeout_seconds).await.unwrap();

        let err = executor.run(&spec.id).await.unwrap_err();
        assert!(matches!(err, CronError::MaxConcurrencyReached(1)));

        lease::release(&held).await;
    }
}
