// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Camera and parking-space configuration: the external datastore contract
//! plus the TTL cache that keeps hot-path reads off it.

pub mod cache;
pub mod file;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use parkhub::wire::NormBox;

/// Camera role within a parking lot.
///
/// Barrier cameras watch the entrance and feed the plate queue; regular
/// cameras watch spaces and consume it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraKind {
    #[default]
    Regular,
    Barrier,
}

fn default_true() -> bool {
    true
}

/// One camera as defined in the datastore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub id: String,
    pub name: String,
    pub parking_lot_id: String,
    pub snapshot_url: String,
    #[serde(default = "default_true")]
    pub worker_enabled: bool,
    /// Per-camera FPS cap overriding the global target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps_override: Option<f64>,
    #[serde(default)]
    pub kind: CameraKind,
    /// Normalized regions where a vehicle counts as "at the barrier".
    /// Only meaningful for barrier cameras; empty means the whole frame.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub barrier_zones: Vec<NormBox>,
}

/// One user-defined parking space, tied to exactly one camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkingSpace {
    pub id: String,
    pub name: String,
    pub parking_lot_id: String,
    pub camera_id: String,
    pub bbox: NormBox,
    #[serde(default)]
    pub occupied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<u64>,
}

/// Occupancy write for one space, idempotent by (space, timestamp).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupancyUpdate {
    pub occupied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<u64>,
    pub timestamp_ms: u64,
}

/// Minimal contract against the external configuration datastore.
///
/// Reads are quota-bound; callers go through [`cache::ConfigCache`] rather
/// than hitting the store per frame.  Occupancy writes are best-effort.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Cameras with `worker_enabled` in active parking lots.
    async fn list_active_cameras(&self) -> anyhow::Result<Vec<CameraConfig>>;

    /// All spaces belonging to the given camera.
    async fn list_spaces(&self, camera_id: &str) -> anyhow::Result<Vec<ParkingSpace>>;

    /// Persist a space's occupancy state.  Failures are logged by callers,
    /// never fatal.
    async fn update_space_occupancy(
        &self,
        space_id: &str,
        update: &OccupancyUpdate,
    ) -> anyhow::Result<()>;
}
