// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health and status endpoints for the watcher.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::supervisor::Supervisor;

/// Shared state for the watcher's own endpoints.
pub struct WatchState {
    pub supervisor: Arc<Supervisor>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub worker_count: usize,
}

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<WatchState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running".to_owned(),
        worker_count: s.supervisor.worker_count().await,
    })
}

/// `GET /api/v1/status` — per-camera worker status records.
pub async fn status(State(s): State<Arc<WatchState>>) -> impl IntoResponse {
    Json(s.supervisor.statuses().await)
}

/// Build the watcher router.
pub fn build_router(state: Arc<WatchState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/status", get(status))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
