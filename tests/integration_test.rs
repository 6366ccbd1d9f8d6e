// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! End-to-end tests wiring the State Store, Agent Turn Engine, Tool
//! Registry, Channel Registry, and Cron Scheduler/Executor together the
//! way the gateway binary does, without standing up the HTTP layer.

use std::collections::HashMap;
use std::sync::Arc;

use nextai_config::{
    AgentInputMessage, CronDispatch, CronJobSpec, CronJobState, CronRuntime, CronSchedule, DispatchTarget,
    Role, ScheduleType, TaskType,
};
use nextai_core::{AgentRequest, Engine, TurnOutcome, VecSink};
use nextai_model::GatewayRunner;
use nextai_scheduler::{resolve_next_run, CronExecutor};
use nextai_store::Store;
use nextai_tools::ToolRegistry;

fn req(text: &str, session_id: &str, user_id: &str, channel: &str) -> AgentRequest {
    AgentRequest {
        input: vec![AgentInputMessage::text(Role::User, text)],
        session_id: session_id.to_string(),
        user_id: user_id.to_string(),
        channel: channel.to_string(),
        stream: false,
        biz_params: serde_json::json!({}),
        raw_body: serde_json::json!({}),
    }
}

async fn make_engine(data_dir: &std::path::Path) -> (Arc<Store>, Arc<Engine>) {
    let store = Arc::new(Store::open(data_dir).await.unwrap());
    let tools = Arc::new(nextai_tools::default_registry());
    let channels = Arc::new(nextai_channels::default_registry());
    let runner = Arc::new(GatewayRunner::new());
    let engine = Arc::new(Engine::new(store.clone(), runner, tools, channels));
    (store, engine)
}

#[tokio::test]
async fn demo_provider_echoes_and_persists_chat_history() {
    let dir = tempfile::tempdir().unwrap();
    let (store, engine) = make_engine(dir.path()).await;

    let mut sink = VecSink::default();
    let outcome = engine.run_turn(req("hello there", "s1", "u1", "console"), &mut sink).await.unwrap();

    let reply = match outcome {
        TurnOutcome::Completed { reply } => reply,
        TurnOutcome::StreamedError => panic!("unexpected streamed error"),
    };
    assert!(reply.contains("hello there"), "demo adapter should echo the input: {reply}");
    assert!(!sink.0.is_empty(), "turn should have emitted at least one event");

    let chat_count = store.read(|s| s.chats.len()).await;
    assert_eq!(chat_count, 1);
    let history_len = store
        .read(|s| s.find_chat_by_key("s1", "u1", "console").map(|c| s.histories[&c.id].len()).unwrap_or(0))
        .await;
    // one user turn in, one assistant reply recorded
    assert_eq!(history_len, 2);
}

#[tokio::test]
async fn second_turn_in_same_chat_reuses_existing_chat_and_appends_history() {
    let dir = tempfile::tempdir().unwrap();
    let (store, engine) = make_engine(dir.path()).await;

    let mut sink = VecSink::default();
    engine.run_turn(req("first", "s1", "u1", "console"), &mut sink).await.unwrap();
    engine.run_turn(req("second", "s1", "u1", "console"), &mut sink).await.unwrap();

    assert_eq!(store.read(|s| s.chats.len()).await, 1);
    let history_len = store
        .read(|s| s.find_chat_by_key("s1", "u1", "console").map(|c| s.histories[&c.id].len()).unwrap_or(0))
        .await;
    assert_eq!(history_len, 4);
}

#[tokio::test]
async fn context_reset_command_clears_the_chat() {
    let dir = tempfile::tempdir().unwrap();
    let (store, engine) = make_engine(dir.path()).await;

    let mut sink = VecSink::default();
    engine.run_turn(req("hello", "s1", "u1", "console"), &mut sink).await.unwrap();
    assert_eq!(store.read(|s| s.chats.len()).await, 1);

    let outcome = engine.run_turn(req("/new", "s1", "u1", "console"), &mut sink).await.unwrap();
    match outcome {
        TurnOutcome::Completed { reply } => assert_eq!(reply, nextai_core::CONTEXT_RESET_REPLY),
        TurnOutcome::StreamedError => panic!("unexpected streamed error"),
    }
    assert_eq!(store.read(|s| s.chats.len()).await, 0);
}

#[tokio::test]
async fn explicit_shell_tool_shortcut_bypasses_generation() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(dir.path()).await.unwrap());
    let tools = Arc::new(nextai_tools::default_registry());
    let channels = Arc::new(nextai_channels::default_registry());
    let runner = Arc::new(GatewayRunner::new());
    let engine = Engine::new(store, runner, tools, channels);

    let mut request = req("irrelevant", "s1", "u1", "console");
    request.raw_body = serde_json::json!({"shell": {"command": "echo hi"}});

    let mut sink = VecSink::default();
    let outcome = engine.run_turn(request, &mut sink).await.unwrap();
    match outcome {
        TurnOutcome::Completed { reply } => assert!(reply.contains("hi")),
        TurnOutcome::StreamedError => panic!("unexpected streamed error"),
    }
}

#[tokio::test]
async fn shell_tool_echo_round_trips_through_the_registry() {
    let mut registry = ToolRegistry::from_env();
    registry.register(nextai_tools::ShellTool::default());
    let out = registry.invoke("shell", &serde_json::json!({"command": "echo round-trip"})).await.unwrap();
    assert!(out.contains("round-trip"));
}

fn text_cron_job(id: &str, interval: &str, text: &str) -> CronJobSpec {
    CronJobSpec {
        id: id.to_string(),
        name: id.to_string(),
        enabled: true,
        schedule: CronSchedule { kind: ScheduleType::Interval, cron: interval.to_string(), timezone: None },
        task_type: TaskType::Text,
        text: Some(text.to_string()),
        workflow: None,
        dispatch: CronDispatch { channel: "console".to_string(), target: DispatchTarget::default(), extra: HashMap::new() },
        runtime: CronRuntime::default(),
        meta: HashMap::new(),
    }
}

#[tokio::test]
async fn cron_job_runs_dispatches_through_console_and_records_success() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(dir.path()).await.unwrap());
    let channels = Arc::new(nextai_channels::default_registry());
    let tools = Arc::new(nextai_tools::default_registry());
    let runner = Arc::new(GatewayRunner::new());
    let engine = Arc::new(Engine::new(store.clone(), runner, tools, channels.clone()));
    let executor = Arc::new(CronExecutor::new(store.clone(), channels, engine));

    let job = text_cron_job("greet", "60s", "good morning");
    store
        .write::<std::convert::Infallible>(|s| {
            s.cron_specs.insert(job.id.clone(), job.clone());
            s.cron_states.insert(job.id.clone(), CronJobState::default());
            Ok(())
        })
        .await
        .unwrap();

    executor.run("greet").await.unwrap();

    let last_status = store.read(|s| s.cron_states.get("greet").and_then(|st| st.last_status.clone())).await;
    assert_eq!(last_status, Some(nextai_config::CronRunStatus::Succeeded));
}

#[tokio::test]
async fn cron_job_pause_then_resume_recomputes_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(dir.path()).await.unwrap());

    let job = text_cron_job("reminder", "30s", "reminder text");
    store
        .write::<std::convert::Infallible>(|s| {
            s.cron_specs.insert(job.id.clone(), job.clone());
            s.cron_states.insert(job.id.clone(), CronJobState::default());
            Ok(())
        })
        .await
        .unwrap();

    // Pause: next_run_at MUST become None.
    store
        .write::<std::convert::Infallible>(|s| {
            let state = s.ensure_cron_state("reminder");
            state.paused = true;
            state.next_run_at = None;
            Ok(())
        })
        .await
        .unwrap();
    let paused_state = store.read(|s| s.cron_states.get("reminder").cloned().unwrap()).await;
    assert!(paused_state.paused);
    assert!(paused_state.next_run_at.is_none());

    // Resume recomputes next_run_at immediately rather than waiting for the
    // next scheduler tick.
    let now = chrono::Utc::now();
    let next = resolve_next_run(&job, None, now).unwrap();
    store
        .write::<std::convert::Infallible>(|s| {
            let state = s.ensure_cron_state("reminder");
            state.paused = false;
            state.next_run_at = next.next_run_at;
            Ok(())
        })
        .await
        .unwrap();
    let resumed_state = store.read(|s| s.cron_states.get("reminder").cloned().unwrap()).await;
    assert!(!resumed_state.paused);
    assert!(resumed_state.next_run_at.is_some());
}

#[tokio::test]
async fn default_system_cron_job_is_protected_from_deletion_by_convention() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path()).await.unwrap();
    // The default job is created automatically on first open.
    store.read(|s| assert!(s.cron_specs.contains_key(nextai_config::DEFAULT_CRON_JOB_ID))).await;
    store.read(|s| assert!(s.cron_specs[nextai_config::DEFAULT_CRON_JOB_ID].is_system_default())).await;
}

#[tokio::test]
async fn store_state_survives_a_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let (store, engine) = make_engine(dir.path()).await;
        let mut sink = VecSink::default();
        engine.run_turn(req("persist me", "s1", "u1", "console"), &mut sink).await.unwrap();
        drop(store);
    }
    let reopened = Store::open(dir.path()).await.unwrap();
    let chat_count = reopened.read(|s| s.chats.len()).await;
    assert_eq!(chat_count, 1);
}
