// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Vehicle detection: frame representation, detector contract, and the
//! detection-to-space matcher.

pub mod http;
pub mod matcher;
pub mod scripted;

use async_trait::async_trait;
use bytes::Bytes;
use image::RgbImage;
use serde::{Deserialize, Serialize};

use parkhub::wire::PixelBox;

/// One fetched camera frame: the raw JPEG plus its decoded pixels.
pub struct Frame {
    pub jpeg: Bytes,
    pub image: RgbImage,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    /// Decode a JPEG snapshot into a frame.
    pub fn decode(jpeg: Bytes) -> anyhow::Result<Self> {
        let decoded =
            image::load_from_memory_with_format(&jpeg, image::ImageFormat::Jpeg)?.to_rgb8();
        let (width, height) = decoded.dimensions();
        Ok(Self { jpeg, image: decoded, width, height })
    }
}

/// One detected object in a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class: String,
    pub confidence: f32,
    pub bbox: PixelBox,
    /// Stable within one worker's tracker session; absent when tracking is
    /// disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<u64>,
}

/// Thresholds and flags passed through to the detector.
#[derive(Debug, Clone, Copy)]
pub struct DetectOptions {
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub tracking: bool,
}

/// Vehicle detector contract.
///
/// Implementations must be thread-safe: every camera worker calls its own
/// logical session concurrently.  When tracking is enabled, track ids must be
/// stable across calls within one worker's lifetime.
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, frame: &Frame, opts: &DetectOptions) -> anyhow::Result<Vec<Detection>>;
}

/// Detector that never detects anything.  Used when no inference service is
/// configured so the rest of the pipeline stays exercisable.
pub struct NullDetector;

#[async_trait]
impl Detector for NullDetector {
    async fn detect(&self, _frame: &Frame, _opts: &DetectOptions) -> anyhow::Result<Vec<Detection>> {
        Ok(Vec::new())
    }
}
