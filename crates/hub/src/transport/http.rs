// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the broadcast hub.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use base64::Engine as _;
use bytes::Bytes;
use serde::Serialize;

use crate::error::HubError;
use crate::state::{epoch_ms, HubState};
use crate::wire::{BroadcastMetadata, IngressResponse};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub broadcaster_count: usize,
    pub viewer_count: usize,
}

#[derive(Debug, Serialize)]
pub struct CameraStatusResponse {
    pub camera_id: String,
    pub viewers: usize,
    pub frame_count: u64,
    pub last_publish_ms: u64,
}

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<HubState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running".to_owned(),
        broadcaster_count: s.broadcaster_count().await,
        viewer_count: s.viewer_count().await,
    })
}

/// `GET /api/v1/cameras/{camera_id}` — status for a camera's broadcaster.
///
/// Strict lookup: unlike subscribing, this never creates a broadcaster, so an
/// unknown (or already swept) camera is a 404.
pub async fn camera_status(
    State(s): State<Arc<HubState>>,
    Path(camera_id): Path<String>,
) -> impl IntoResponse {
    match s.get(&camera_id).await {
        Some(b) => Json(CameraStatusResponse {
            camera_id,
            viewers: b.viewer_count(),
            frame_count: b.frame_count(),
            last_publish_ms: b.last_publish_ms(),
        })
        .into_response(),
        None => HubError::CameraNotFound
            .to_http_response(format!("no broadcaster for camera {camera_id}"))
            .into_response(),
    }
}

/// `POST /api/broadcast-detection` — worker ingress.
///
/// Each POST replaces the latest frame for the camera, so producer retries
/// are safe.  The body is validated field-by-field: missing `camera_id` or
/// `frame_base64`, and undecodable base64, are all 400s with no broadcaster
/// state change.
pub async fn broadcast_detection(
    State(s): State<Arc<HubState>>,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    let camera_id = match body.get("camera_id").and_then(|v| v.as_str()) {
        Some(id) if !id.is_empty() => id.to_owned(),
        _ => {
            return HubError::BadRequest
                .to_http_response("missing or empty camera_id")
                .into_response()
        }
    };

    let frame_base64 = match body.get("frame_base64").and_then(|v| v.as_str()) {
        Some(b64) if !b64.is_empty() => b64,
        _ => {
            return HubError::BadRequest
                .to_http_response("missing or empty frame_base64")
                .into_response()
        }
    };

    let frame = match base64::engine::general_purpose::STANDARD.decode(frame_base64) {
        Ok(bytes) => Bytes::from(bytes),
        Err(e) => {
            return HubError::BadRequest
                .to_http_response(format!("invalid base64 frame: {e}"))
                .into_response()
        }
    };

    // Metadata is optional; unknown fields inside it are ignored.
    let metadata: BroadcastMetadata = match body.get("metadata") {
        Some(v) if !v.is_null() => match serde_json::from_value(v.clone()) {
            Ok(m) => m,
            Err(e) => {
                return HubError::BadRequest
                    .to_http_response(format!("invalid metadata: {e}"))
                    .into_response()
            }
        },
        _ => BroadcastMetadata::default(),
    };

    let frame_size = frame.len();
    let broadcaster = s.get_or_create(&camera_id).await;
    let viewers = broadcaster.publish(frame, metadata);

    Json(IngressResponse {
        success: true,
        viewers,
        camera_id,
        frame_size,
        timestamp: epoch_ms(),
    })
    .into_response()
}
