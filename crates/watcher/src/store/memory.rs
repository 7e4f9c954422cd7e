// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory `ConfigStore` used by tests and by watchers started without a
//! backing document.  Read calls are counted so cache-coalescing behavior is
//! observable.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{CameraConfig, ConfigStore, OccupancyUpdate, ParkingSpace};

#[derive(Default)]
struct Inner {
    cameras: Vec<CameraConfig>,
    spaces: Vec<ParkingSpace>,
    updates: Vec<(String, OccupancyUpdate)>,
}

/// Instrumented in-memory store.
#[derive(Default)]
pub struct MemoryStore {
    inner: parking_lot::RwLock<Inner>,
    camera_reads: AtomicUsize,
    space_reads: AtomicUsize,
    fail_reads: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_cameras(&self, cameras: Vec<CameraConfig>) {
        self.inner.write().cameras = cameras;
    }

    pub fn set_spaces(&self, spaces: Vec<ParkingSpace>) {
        self.inner.write().spaces = spaces;
    }

    /// Enable or disable one camera's worker in place.
    pub fn set_worker_enabled(&self, camera_id: &str, enabled: bool) {
        let mut inner = self.inner.write();
        for camera in inner.cameras.iter_mut() {
            if camera.id == camera_id {
                camera.worker_enabled = enabled;
            }
        }
    }

    /// Make subsequent list reads fail, for cache-failure tests.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }

    /// Number of `list_active_cameras` calls observed.
    pub fn camera_reads(&self) -> usize {
        self.camera_reads.load(Ordering::Relaxed)
    }

    /// Number of `list_spaces` calls observed.
    pub fn space_reads(&self) -> usize {
        self.space_reads.load(Ordering::Relaxed)
    }

    /// Occupancy updates received, in call order.
    pub fn updates(&self) -> Vec<(String, OccupancyUpdate)> {
        self.inner.read().updates.clone()
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn list_active_cameras(&self) -> anyhow::Result<Vec<CameraConfig>> {
        self.camera_reads.fetch_add(1, Ordering::Relaxed);
        if self.fail_reads.load(Ordering::Relaxed) {
            anyhow::bail!("simulated store read failure");
        }
        let inner = self.inner.read();
        Ok(inner.cameras.iter().filter(|c| c.worker_enabled).cloned().collect())
    }

    async fn list_spaces(&self, camera_id: &str) -> anyhow::Result<Vec<ParkingSpace>> {
        self.space_reads.fetch_add(1, Ordering::Relaxed);
        if self.fail_reads.load(Ordering::Relaxed) {
            anyhow::bail!("simulated store read failure");
        }
        let inner = self.inner.read();
        Ok(inner.spaces.iter().filter(|s| s.camera_id == camera_id).cloned().collect())
    }

    async fn update_space_occupancy(
        &self,
        space_id: &str,
        update: &OccupancyUpdate,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.write();
        for space in inner.spaces.iter_mut() {
            if space.id == space_id {
                space.occupied = update.occupied;
                space.plate = update.plate.clone();
                space.track_id = update.track_id;
                space.last_updated_ms = Some(update.timestamp_ms);
            }
        }
        inner.updates.push((space_id.to_owned(), update.clone()));
        Ok(())
    }
}
