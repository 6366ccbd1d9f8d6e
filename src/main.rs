// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The `nextai` agent gateway binary: wires the State Store, Agent Turn
//! Engine, Cron Scheduler/Executor, and Inbound Session Supervisor into one
//! axum HTTP process, plus a small CLI for config inspection and headless
//! single-turn/single-job invocation.

mod cli;
mod error;
mod http;
mod state;

use std::io::Read as _;
use std::sync::Arc;

use clap::{CommandFactory, Parser};
use nextai_core::{AgentRequest, Engine, TurnOutcome, VecSink};
use nextai_model::GatewayRunner;
use nextai_scheduler::{CronExecutor, Scheduler};
use nextai_store::Store;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Command};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = nextai_config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::ShowConfig => {
            print!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }
        Command::Agent { text, channel, session_id, user_id } => {
            run_headless_turn(config, text, channel, session_id, user_id).await
        }
        Command::Cron { job_id } => run_headless_cron(config, job_id).await,
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

/// Builds the shared store/engine/executor stack common to every entry
/// point (server, headless agent run, headless cron run).
async fn build_runtime(
    config: &nextai_config::GatewayConfig,
) -> anyhow::Result<(Arc<Store>, Arc<Engine>, Arc<CronExecutor>)> {
    let store = Arc::new(Store::open(&config.data_dir).await?);
    let tools = Arc::new(nextai_tools::default_registry());
    let channels = Arc::new(nextai_channels::default_registry());
    let runner = Arc::new(GatewayRunner::new());
    let engine = Arc::new(Engine::new(store.clone(), runner, tools, channels.clone()));
    let executor = Arc::new(CronExecutor::new(store.clone(), channels, engine.clone()));
    Ok((store, engine, executor))
}

async fn serve(config: nextai_config::GatewayConfig) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let (store, engine, executor) = build_runtime(&config).await?;

    let scheduler = Arc::new(Scheduler::new(store.clone(), executor.clone()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler_task = {
        let scheduler = scheduler.clone();
        let rx = shutdown_rx.clone();
        tokio::spawn(async move { scheduler.run(rx).await })
    };

    let supervisor_task = if env_flag_enabled("NEXTAI_DISABLE_QQ_INBOUND_SUPERVISOR") {
        info!("nextai: inbound supervisor disabled via NEXTAI_DISABLE_QQ_INBOUND_SUPERVISOR");
        None
    } else {
        let supervisor = Arc::new(nextai_inbound::Supervisor::new(store.clone(), engine.clone()));
        let rx = shutdown_rx.clone();
        Some(tokio::spawn(async move { supervisor.run(rx).await }))
    };

    let app_state = AppState { store: store.clone(), engine: engine.clone(), executor, config: config.clone() };
    let app = http::router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "nextai: listening");

    let shutdown_signal = async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("nextai: shutdown signal received, draining in-flight work");
        let _ = shutdown_tx.send(true);
    };

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal).await?;

    if let Err(e) = scheduler_task.await {
        warn!(error = %e, "cron scheduler task panicked");
    }
    if let Some(task) = supervisor_task {
        if let Err(e) = task.await {
            warn!(error = %e, "inbound supervisor task panicked");
        }
    }
    Ok(())
}

async fn run_headless_turn(
    config: nextai_config::GatewayConfig,
    text: Option<String>,
    channel: String,
    session_id: String,
    user_id: String,
) -> anyhow::Result<()> {
    let (_store, engine, _executor) = build_runtime(&config).await?;

    let text = match text {
        Some(t) => t,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let req = AgentRequest {
        input: vec![nextai_config::AgentInputMessage::text(nextai_config::Role::User, text)],
        session_id,
        user_id,
        channel,
        stream: false,
        biz_params: serde_json::json!({}),
        raw_body: serde_json::json!({}),
    };

    let mut sink = VecSink::default();
    match engine.run_turn(req, &mut sink).await {
        Ok(TurnOutcome::Completed { reply }) => {
            println!("{reply}");
            Ok(())
        }
        Ok(TurnOutcome::StreamedError) => anyhow::bail!("unexpected streamed error in headless mode"),
        Err(e) => anyhow::bail!("agent turn failed: {e}"),
    }
}

async fn run_headless_cron(config: nextai_config::GatewayConfig, job_id: String) -> anyhow::Result<()> {
    let (_store, _engine, executor) = build_runtime(&config).await?;
    executor.run(&job_id).await.map_err(|e| anyhow::anyhow!("cron job '{job_id}' failed: {e}"))?;
    println!("dispatched '{job_id}'");
    Ok(())
}

fn env_flag_enabled(name: &str) -> bool {
    match std::env::var(name) {
        Ok(v) => {
            let v = v.trim();
            v.eq_ignore_ascii_case("true") || v.parse::<f64>().map(|n| n != 0.0).unwrap_or(false)
        }
        Err(_) => false,
    }
}
