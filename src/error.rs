// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The §7 error mapper: turns the core's typed errors into the HTTP
//! surface's `{"error":{"code","message","details"}}` shape and status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use nextai_core::EngineError;
use nextai_scheduler::CronError;
use serde_json::Value;

/// An HTTP-mapped error ready for `IntoResponse` (§7 table).
pub struct HttpError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<Value>,
}

impl HttpError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into(), details: None }
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }
}

impl HttpError {
    /// Renders this error as an SSE `error` event frame (spec §4.E event
    /// alphabet / §7 "if emission has started, failures become an `error`
    /// event"). Used when a turn fails before the engine's own recovery
    /// path had a chance to emit one itself (e.g. a store error while
    /// resolving the chat, before any event was produced) but the response
    /// headers already committed the caller to an SSE stream.
    pub fn to_sse_error_frame(&self) -> String {
        let event = nextai_core::AgentEvent::Error {
            step: 1,
            meta: nextai_core::ErrorMeta {
                code: self.code.to_string(),
                message: self.message.clone(),
                details: self.details.clone(),
            },
        };
        event.to_sse_frame()
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "code": self.code,
                "message": self.message,
                "details": self.details,
            }
        });
        (self.status, axum::Json(body)).into_response()
    }
}

/// §7 table: provider/tool/channel/request error kinds → HTTP status.
impl From<EngineError> for HttpError {
    fn from(e: EngineError) -> Self {
        let status = match &e {
            EngineError::ProviderNotConfigured
            | EngineError::ProviderDisabled(_)
            | EngineError::ModelNotFound(_)
            | EngineError::ProviderNotSupported(_) => StatusCode::BAD_REQUEST,
            EngineError::ProviderRequestFailed(_) | EngineError::ProviderInvalidReply(_) => {
                StatusCode::BAD_GATEWAY
            }
            EngineError::ToolDisabled(_) => StatusCode::FORBIDDEN,
            EngineError::ToolNotSupported(_) => StatusCode::BAD_REQUEST,
            EngineError::ToolInvalidInput(_) => StatusCode::BAD_REQUEST,
            EngineError::ToolRuntimeUnavailable(_)
            | EngineError::ToolInvokeFailed(_)
            | EngineError::ToolInvalidResult(_) => StatusCode::BAD_GATEWAY,
            EngineError::InvalidChannel | EngineError::ChannelNotSupported(_) => StatusCode::BAD_REQUEST,
            EngineError::ChannelDisabled(_) => StatusCode::BAD_REQUEST,
            EngineError::ChannelDispatchFailed(_) => StatusCode::BAD_GATEWAY,
            EngineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            EngineError::StoreError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let code = e.code();
        let message = e.to_string();
        Self { status, code, message, details: e.details() }
    }
}

impl From<CronError> for HttpError {
    fn from(e: CronError) -> Self {
        let status = match &e {
            CronError::NotFound(_) => StatusCode::NOT_FOUND,
            CronError::DefaultProtected => StatusCode::BAD_REQUEST,
            CronError::MaxConcurrencyReached(_) => StatusCode::CONFLICT,
            CronError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let code = e.code();
        Self { status, code, message: e.to_string(), details: None }
    }
}

impl From<nextai_store::StoreError> for HttpError {
    fn from(e: nextai_store::StoreError) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
    }
}
