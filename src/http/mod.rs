// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The axum HTTP surface (spec §6): agent turns, chats CRUD, cron CRUD
//! and control.

mod agent;
mod chats;
mod cron;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/agent/process", post(agent::process))
        .route("/agent/system-layers", get(agent::system_layers))
        .route("/chats", get(chats::list).post(chats::create))
        .route("/chats/batch-delete", post(chats::batch_delete))
        .route("/chats/:id", get(chats::get).put(chats::update).delete(chats::delete))
        .route("/cron/jobs", get(cron::list).post(cron::create))
        .route("/cron/jobs/:id", get(cron::get).put(cron::update).delete(cron::delete))
        .route("/cron/jobs/:id/pause", post(cron::pause))
        .route("/cron/jobs/:id/resume", post(cron::resume))
        .route("/cron/jobs/:id/run", post(cron::run))
        .route("/cron/jobs/:id/state", get(cron::get_state))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
