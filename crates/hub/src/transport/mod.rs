// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the broadcast hub.

pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::HubState;

/// Build the axum `Router` with all hub routes.
pub fn build_router(state: Arc<HubState>) -> Router {
    Router::new()
        // Health + status (no auth)
        .route("/api/v1/health", get(http::health))
        .route("/api/v1/cameras/{camera_id}", get(http::camera_status))
        .with_state(Arc::clone(&state))
        .merge(build_edge_router(state))
        .layer(CorsLayer::permissive())
}

/// The two core edge routes only, for embedding the hub in another server
/// that has its own health surface.
pub fn build_edge_router(state: Arc<HubState>) -> Router {
    Router::new()
        // Worker ingress
        .route("/api/broadcast-detection", post(http::broadcast_detection))
        // Viewer egress
        .route("/ws/viewer/detection", get(ws::viewer_handler))
        .with_state(state)
}
