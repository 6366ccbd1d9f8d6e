// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Shared application state threaded through every axum handler.

use std::sync::Arc;

use nextai_config::GatewayConfig;
use nextai_core::Engine;
use nextai_scheduler::CronExecutor;
use nextai_store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub engine: Arc<Engine>,
    pub executor: Arc<CronExecutor>,
    pub config: Arc<GatewayConfig>,
}
