// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed `ConfigStore`: one JSON document holding cameras and spaces,
//! rewritten atomically (write tmp + rename) on occupancy updates.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{CameraConfig, ConfigStore, OccupancyUpdate, ParkingSpace};

/// On-disk document shape.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    pub cameras: Vec<CameraConfig>,
    #[serde(default)]
    pub spaces: Vec<ParkingSpace>,
}

/// JSON-document store.  Reads parse the file fresh; the `ConfigCache` keeps
/// per-frame traffic away from it.
pub struct FileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles on the document.
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    async fn load(&self) -> anyhow::Result<ConfigDocument> {
        let contents = tokio::fs::read_to_string(&self.path).await?;
        let doc: ConfigDocument = serde_json::from_str(&contents)?;
        Ok(doc)
    }

    async fn save(&self, doc: &ConfigDocument) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(doc)?;
        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for FileStore {
    async fn list_active_cameras(&self) -> anyhow::Result<Vec<CameraConfig>> {
        let doc = self.load().await?;
        Ok(doc.cameras.into_iter().filter(|c| c.worker_enabled).collect())
    }

    async fn list_spaces(&self, camera_id: &str) -> anyhow::Result<Vec<ParkingSpace>> {
        let doc = self.load().await?;
        Ok(doc.spaces.into_iter().filter(|s| s.camera_id == camera_id).collect())
    }

    async fn update_space_occupancy(
        &self,
        space_id: &str,
        update: &OccupancyUpdate,
    ) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load().await?;
        let mut found = false;
        for space in doc.spaces.iter_mut() {
            if space.id == space_id {
                space.occupied = update.occupied;
                space.plate = update.plate.clone();
                space.track_id = update.track_id;
                space.last_updated_ms = Some(update.timestamp_ms);
                found = true;
            }
        }
        if !found {
            anyhow::bail!("unknown space id: {space_id}");
        }
        self.save(&doc).await
    }
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
