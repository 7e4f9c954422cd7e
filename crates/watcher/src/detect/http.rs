// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for a remote detection/tracking inference service.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use parkhub::wire::PixelBox;

use super::{DetectOptions, Detection, Detector, Frame};

/// Detector backed by an inference sidecar.
///
/// The service owns tracker state keyed by `session`, so track ids stay
/// stable across calls from the same worker.
pub struct HttpDetector {
    base_url: String,
    session: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    detections: Vec<WireDetection>,
}

#[derive(Debug, Deserialize)]
struct WireDetection {
    class: String,
    confidence: f32,
    bbox: PixelBox,
    #[serde(default)]
    track_id: Option<u64>,
}

impl HttpDetector {
    /// `session` identifies this caller's tracker session; workers pass their
    /// camera id.
    pub fn new(base_url: impl Into<String>, session: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { base_url: base_url.into(), session: session.into(), client }
    }
}

#[async_trait]
impl Detector for HttpDetector {
    async fn detect(&self, frame: &Frame, opts: &DetectOptions) -> anyhow::Result<Vec<Detection>> {
        let url = format!("{}/api/v1/detect", self.base_url.trim_end_matches('/'));
        let conf = opts.conf_threshold.to_string();
        let iou = opts.iou_threshold.to_string();
        let track = opts.tracking.to_string();
        let resp = self
            .client
            .post(url)
            .query(&[
                ("session", self.session.as_str()),
                ("conf", conf.as_str()),
                ("iou", iou.as_str()),
                ("track", track.as_str()),
            ])
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(frame.jpeg.clone())
            .send()
            .await?
            .error_for_status()?;

        let body: DetectResponse = resp.json().await?;
        Ok(body
            .detections
            .into_iter()
            .map(|d| Detection {
                class: d.class,
                confidence: d.confidence,
                bbox: d.bbox,
                track_id: d.track_id,
            })
            .collect())
    }
}
