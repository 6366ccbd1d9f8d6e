// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Chats CRUD (spec §6): `GET/POST /chats`, `POST /chats/batch-delete`,
//! `GET/PUT/DELETE /chats/{id}`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use nextai_config::Chat;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HttpError;
use crate::state::AppState;

/// The exact key set the spec requires for a returned chat (§3, §6).
#[derive(Serialize)]
struct ChatBody {
    id: String,
    name: String,
    session_id: String,
    user_id: String,
    channel: String,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
    meta: std::collections::HashMap<String, Value>,
}

impl From<&Chat> for ChatBody {
    fn from(c: &Chat) -> Self {
        Self {
            id: c.id.clone(),
            name: c.name.clone(),
            session_id: c.session_id.clone(),
            user_id: c.user_id.clone(),
            channel: c.channel.clone(),
            created_at: c.created_at,
            updated_at: c.updated_at,
            meta: c.meta.clone(),
        }
    }
}

pub async fn list(State(state): State<AppState>) -> Response {
    let chats: Vec<ChatBody> = state.store.read(|s| s.chats.values().map(ChatBody::from).collect()).await;
    Json(chats).into_response()
}

#[derive(Deserialize)]
pub struct CreateChat {
    session_id: String,
    user_id: String,
    channel: String,
    #[serde(default)]
    name: Option<String>,
}

pub async fn create(State(state): State<AppState>, Json(body): Json<CreateChat>) -> Response {
    let mut chat = Chat::new(body.session_id, body.user_id, body.channel);
    if let Some(name) = body.name {
        chat.name = name;
    }
    let out = ChatBody::from(&chat);
    let result = state
        .store
        .write::<std::convert::Infallible>(|s| {
            s.chats.insert(chat.id.clone(), chat.clone());
            Ok(())
        })
        .await;
    if let Err(nextai_store::WriteOutcome::Store(e)) = result {
        return HttpError::from(e).into_response();
    }
    (StatusCode::OK, Json(out)).into_response()
}

pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let found = state
        .store
        .read(|s| s.chats.get(&id).map(|c| (ChatBody::from(c), s.histories.get(&id).cloned().unwrap_or_default())))
        .await;
    match found {
        Some((chat, history)) => {
            let mut value = serde_json::to_value(chat).unwrap();
            value["history"] = serde_json::to_value(history).unwrap();
            Json(value).into_response()
        }
        None => HttpError::not_found(format!("chat '{id}' not found")).into_response(),
    }
}

#[derive(Deserialize)]
pub struct UpdateChat {
    name: Option<String>,
    meta: Option<std::collections::HashMap<String, Value>>,
}

pub async fn update(State(state): State<AppState>, Path(id): Path<String>, Json(body): Json<UpdateChat>) -> Response {
    let result = state
        .store
        .write::<&'static str>(|s| {
            let chat = s.chats.get_mut(&id).ok_or("not_found")?;
            if let Some(name) = &body.name {
                chat.name = name.clone();
            }
            if let Some(meta) = &body.meta {
                chat.meta = meta.clone();
            }
            chat.updated_at = chrono::Utc::now();
            Ok(())
        })
        .await;
    match result {
        Ok(()) => {
            let out = state.store.read(|s| s.chats.get(&id).map(ChatBody::from)).await;
            Json(out).into_response()
        }
        Err(nextai_store::WriteOutcome::User("not_found")) => {
            HttpError::not_found(format!("chat '{id}' not found")).into_response()
        }
        Err(nextai_store::WriteOutcome::User(_)) => unreachable!(),
        Err(nextai_store::WriteOutcome::Store(e)) => HttpError::from(e).into_response(),
    }
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let result = state
        .store
        .write::<&'static str>(|s| if s.delete_chat(&id) { Ok(()) } else { Err("not_found") })
        .await;
    match result {
        Ok(()) => Json(serde_json::json!({ "deleted": true })).into_response(),
        Err(nextai_store::WriteOutcome::User(_)) => {
            HttpError::not_found(format!("chat '{id}' not found")).into_response()
        }
        Err(nextai_store::WriteOutcome::Store(e)) => HttpError::from(e).into_response(),
    }
}

#[derive(Deserialize)]
pub struct BatchDelete {
    ids: Vec<String>,
}

pub async fn batch_delete(State(state): State<AppState>, Json(body): Json<BatchDelete>) -> Response {
    let result = state
        .store
        .write::<std::convert::Infallible>(|s| {
            for id in &body.ids {
                s.delete_chat(id);
            }
            Ok(())
        })
        .await;
    if let Err(nextai_store::WriteOutcome::Store(e)) = result {
        return HttpError::from(e).into_response();
    }
    Json(serde_json::json!({ "deleted": true })).into_response()
}
