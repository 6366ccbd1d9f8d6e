// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Cron job CRUD and control (spec §4.G, §6): `GET/POST /cron/jobs`,
//! `GET/PUT/DELETE /cron/jobs/{id}`, `POST /cron/jobs/{id}/pause|resume|run`,
//! `GET /cron/jobs/{id}/state`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use nextai_config::{CronJobSpec, CronJobState, DEFAULT_CRON_JOB_ID};
use nextai_scheduler::{resolve_next_run, CronError};
use serde_json::Value;

use crate::error::HttpError;
use crate::state::AppState;

fn job_view(spec: &CronJobSpec, state: &CronJobState) -> Value {
    serde_json::json!({ "spec": spec, "state": state })
}

fn job_view_in(s: &nextai_config::State, id: &str) -> Option<Value> {
    let spec = s.cron_specs.get(id)?;
    let default_state = CronJobState::default();
    let job_state = s.cron_states.get(id).unwrap_or(&default_state);
    Some(job_view(spec, job_state))
}

pub async fn list(State(state): State<AppState>) -> Response {
    let jobs = state
        .store
        .read(|s| {
            let default_state = CronJobState::default();
            s.cron_specs
                .values()
                .map(|spec| job_view(spec, s.cron_states.get(&spec.id).unwrap_or(&default_state)))
                .collect::<Vec<_>>()
        })
        .await;
    Json(jobs).into_response()
}

pub async fn create(State(state): State<AppState>, Json(spec): Json<CronJobSpec>) -> Response {
    if spec.id.is_empty() {
        return HttpError::bad_request("invalid_request", "cron job id must not be empty").into_response();
    }
    let now = chrono::Utc::now();
    let next = match resolve_next_run(&spec, None, now) {
        Ok(n) => n,
        Err(e) => return HttpError::bad_request("invalid_request", e.to_string()).into_response(),
    };
    let result = state
        .store
        .write::<&'static str>(|s| {
            if s.cron_specs.contains_key(&spec.id) {
                return Err("already_exists");
            }
            let job_state = CronJobState {
                next_run_at: if spec.enabled { next.next_run_at } else { None },
                ..Default::default()
            };
            s.cron_specs.insert(spec.id.clone(), spec.clone());
            s.cron_states.insert(spec.id.clone(), job_state);
            Ok(())
        })
        .await;
    match result {
        Ok(()) => {
            let view = state.store.read(|s| job_view_in(s, &spec.id)).await;
            (StatusCode::OK, Json(view)).into_response()
        }
        Err(nextai_store::WriteOutcome::User(_)) => {
            HttpError::bad_request("invalid_request", format!("cron job '{}' already exists", spec.id)).into_response()
        }
        Err(nextai_store::WriteOutcome::Store(e)) => HttpError::from(e).into_response(),
    }
}

pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let found = state.store.read(|s| job_view_in(s, &id)).await;
    match found {
        Some(view) => Json(view).into_response(),
        None => HttpError::not_found(format!("cron job '{id}' not found")).into_response(),
    }
}

pub async fn update(State(state): State<AppState>, Path(id): Path<String>, Json(body): Json<Value>) -> Response {
    let result = state
        .store
        .write::<&'static str>(|s| {
            let spec = s.cron_specs.get(&id).ok_or("not_found")?.clone();
            let mut merged = serde_json::to_value(&spec).map_err(|_| "invalid_request")?;
            merge_json(&mut merged, &body);
            let mut updated: CronJobSpec = serde_json::from_value(merged).map_err(|_| "invalid_request")?;
            updated.id = id.clone();
            s.cron_specs.insert(id.clone(), updated);
            Ok(())
        })
        .await;
    match result {
        Ok(()) => {
            let view = state.store.read(|s| job_view_in(s, &id)).await;
            Json(view).into_response()
        }
        Err(nextai_store::WriteOutcome::User("not_found")) => {
            HttpError::not_found(format!("cron job '{id}' not found")).into_response()
        }
        Err(nextai_store::WriteOutcome::User(_)) => {
            HttpError::bad_request("invalid_request", "malformed cron job update").into_response()
        }
        Err(nextai_store::WriteOutcome::Store(e)) => HttpError::from(e).into_response(),
    }
}

fn merge_json(base: &mut Value, patch: &Value) {
    if let (Some(base_map), Some(patch_map)) = (base.as_object_mut(), patch.as_object()) {
        for (k, v) in patch_map {
            if let Some(existing) = base_map.get_mut(k) {
                if existing.is_object() && v.is_object() {
                    merge_json(existing, v);
                    continue;
                }
            }
            base_map.insert(k.clone(), v.clone());
        }
    }
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    if id == DEFAULT_CRON_JOB_ID {
        return HttpError::from(CronError::DefaultProtected).into_response();
    }
    let result = state
        .store
        .write::<&'static str>(|s| {
            if s.cron_specs.remove(&id).is_none() {
                return Err("not_found");
            }
            s.cron_states.remove(&id);
            Ok(())
        })
        .await;
    match result {
        Ok(()) => Json(serde_json::json!({ "deleted": true })).into_response(),
        Err(nextai_store::WriteOutcome::User(_)) => {
            HttpError::not_found(format!("cron job '{id}' not found")).into_response()
        }
        Err(nextai_store::WriteOutcome::Store(e)) => HttpError::from(e).into_response(),
    }
}

pub async fn pause(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let result = state
        .store
        .write::<&'static str>(|s| {
            if !s.cron_specs.contains_key(&id) {
                return Err("not_found");
            }
            let job_state = s.ensure_cron_state(&id);
            job_state.paused = true;
            job_state.next_run_at = None;
            Ok(())
        })
        .await;
    match result {
        Ok(()) => {
            let view = state.store.read(|s| job_view_in(s, &id)).await;
            Json(view).into_response()
        }
        Err(nextai_store::WriteOutcome::User(_)) => {
            HttpError::not_found(format!("cron job '{id}' not found")).into_response()
        }
        Err(nextai_store::WriteOutcome::Store(e)) => HttpError::from(e).into_response(),
    }
}

/// Resuming a paused job recomputes `next_run_at` immediately (spec §4.G
/// "State transitions") rather than waiting for the next scheduler tick.
pub async fn resume(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let now = chrono::Utc::now();
    let result = state
        .store
        .write::<&'static str>(|s| {
            let spec = s.cron_specs.get(&id).ok_or("not_found")?.clone();
            let next = resolve_next_run(&spec, None, now).map_err(|_| "invalid_schedule")?;
            let job_state = s.ensure_cron_state(&id);
            job_state.paused = false;
            job_state.next_run_at = next.next_run_at;
            Ok(())
        })
        .await;
    match result {
        Ok(()) => {
            let view = state.store.read(|s| job_view_in(s, &id)).await;
            Json(view).into_response()
        }
        Err(nextai_store::WriteOutcome::User("not_found")) => {
            HttpError::not_found(format!("cron job '{id}' not found")).into_response()
        }
        Err(nextai_store::WriteOutcome::User(_)) => {
            HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, "runner_error", "could not resolve next run").into_response()
        }
        Err(nextai_store::WriteOutcome::Store(e)) => HttpError::from(e).into_response(),
    }
}

pub async fn run(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.executor.run(&id).await {
        Ok(()) => Json(serde_json::json!({ "dispatched": true })).into_response(),
        Err(e) => HttpError::from(e).into_response(),
    }
}

pub async fn get_state(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let found = state.store.read(|s| s.cron_states.get(&id).cloned()).await;
    match found {
        Some(job_state) => Json(job_state).into_response(),
        None => HttpError::not_found(format!("cron job '{id}' not found")).into_response(),
    }
}
