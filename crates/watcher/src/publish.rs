// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frame publication: direct in-process publish to an embedded hub, or an
//! HTTP POST to a remote one.  Workers never block on viewers either way.

use std::sync::Arc;

use base64::Engine as _;
use bytes::Bytes;
use reqwest::Client;

use parkhub::state::HubState;
use parkhub::wire::{BroadcastMetadata, IngressResponse};

/// Where a worker hands off encoded frames.
#[derive(Clone)]
pub enum FramePublisher {
    /// Hub running in this process.
    Local(Arc<HubState>),
    /// Standalone hub reached over HTTP ingress.
    Remote(Arc<HubClient>),
}

impl FramePublisher {
    pub fn local(hub: Arc<HubState>) -> Self {
        Self::Local(hub)
    }

    pub fn remote(base_url: impl Into<String>) -> Self {
        Self::Remote(Arc::new(HubClient::new(base_url)))
    }

    /// Publish one frame, returning the current viewer count.
    pub async fn publish(
        &self,
        camera_id: &str,
        frame: Bytes,
        metadata: BroadcastMetadata,
    ) -> anyhow::Result<usize> {
        match self {
            Self::Local(hub) => {
                let broadcaster = hub.get_or_create(camera_id).await;
                Ok(broadcaster.publish(frame, metadata))
            }
            Self::Remote(client) => client.broadcast(camera_id, &frame, &metadata).await,
        }
    }

    /// Viewer count for a camera, when observable from this process.
    pub async fn viewer_count(&self, camera_id: &str) -> Option<usize> {
        match self {
            Self::Local(hub) => Some(hub.get(camera_id).await.map(|b| b.viewer_count()).unwrap_or(0)),
            Self::Remote(_) => None,
        }
    }
}

/// HTTP client for the hub's broadcast ingress.
pub struct HubClient {
    base_url: String,
    client: Client,
}

impl HubClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { base_url, client }
    }

    /// `POST /api/broadcast-detection` — replaces the camera's latest frame.
    pub async fn broadcast(
        &self,
        camera_id: &str,
        frame: &Bytes,
        metadata: &BroadcastMetadata,
    ) -> anyhow::Result<usize> {
        let body = serde_json::json!({
            "camera_id": camera_id,
            "frame_base64": base64::engine::general_purpose::STANDARD.encode(frame),
            "metadata": metadata,
        });
        let resp = self
            .client
            .post(format!("{}/api/broadcast-detection", self.base_url))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let body: IngressResponse = resp.json().await?;
        Ok(body.viewers)
    }
}
