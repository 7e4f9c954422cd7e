// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared wire-format types for the detection broadcast pipeline.
//!
//! This module is the canonical source for the frame-metadata schema, used by
//! both the standalone `parkhub` binary and watchers embedding the hub
//! in-process.  Unknown fields are tolerated on ingress (serde default
//! behavior) and never invented on egress.

use serde::{Deserialize, Serialize};

// -- Geometry -----------------------------------------------------------------

/// Resolution-independent bounding box with all components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl NormBox {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Whether the box satisfies the normalized-bbox invariant:
    /// `0 <= x`, `0 <= y`, `x + w <= 1`, `y + h <= 1`, `w > 0`, `h > 0`.
    pub fn is_valid(&self) -> bool {
        self.x >= 0.0
            && self.y >= 0.0
            && self.w > 0.0
            && self.h > 0.0
            && self.x + self.w <= 1.0
            && self.y + self.h <= 1.0
    }

    pub fn area(&self) -> f32 {
        self.w * self.h
    }

    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }
}

/// Bounding box in source-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBox {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl PixelBox {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// Center point in pixel coordinates.
    pub fn center(&self) -> (f32, f32) {
        (self.x as f32 + self.w as f32 / 2.0, self.y as f32 + self.h as f32 / 2.0)
    }
}

// -- Frame metadata -----------------------------------------------------------

/// Per-space status within one frame's metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceStatus {
    pub id: String,
    pub name: String,
    pub occupied: bool,
    pub bbox: NormBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plate: Option<String>,
}

/// Per-detection record within one frame's metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionInfo {
    pub class: String,
    pub confidence: f32,
    pub bbox: PixelBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plate: Option<String>,
}

/// A (detection index, space id) pair selected by the greedy matcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedPair {
    pub detection: usize,
    pub space: String,
}

/// Structured metadata broadcast alongside each annotated frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BroadcastMetadata {
    pub vehicle_count: usize,
    pub occupied_spaces: usize,
    pub total_spaces: usize,
    #[serde(default)]
    pub spaces: Vec<SpaceStatus>,
    #[serde(default)]
    pub detections: Vec<DetectionInfo>,
    #[serde(default)]
    pub matches: Vec<MatchedPair>,
    pub tracking_enabled: bool,
    pub timestamp_ms: u64,
}

// -- Ingress ------------------------------------------------------------------

/// Response body for `POST /api/broadcast-detection`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngressResponse {
    pub success: bool,
    pub viewers: usize,
    pub camera_id: String,
    pub frame_size: usize,
    pub timestamp: u64,
}

// -- Egress -------------------------------------------------------------------

/// JSON messages sent to `/ws/viewer/detection` clients.
///
/// Keepalives and pongs are plain text frames, not part of this enum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewerMessage {
    /// An annotated frame plus its metadata.
    Frame {
        camera_id: String,
        /// `data:image/jpeg;base64,…` payload.
        frame: String,
        metadata: BroadcastMetadata,
        frame_count: u64,
        timestamp: u64,
    },
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
