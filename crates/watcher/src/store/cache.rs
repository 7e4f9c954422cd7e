// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TTL-cached snapshot of camera and space configuration.
//!
//! The datastore has strict read quotas; per-frame reads would exhaust them.
//! All hot-path reads are served from an in-memory snapshot refreshed lazily
//! when older than the TTL, or eagerly after `invalidate()`.  A failed
//! refresh keeps serving the previous snapshot and re-arms the TTL so read
//! pressure never amplifies store traffic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};

use super::{CameraConfig, ConfigStore, ParkingSpace};

/// Immutable point-in-time view of the configuration.
pub struct ConfigSnapshot {
    pub cameras: Vec<CameraConfig>,
    pub spaces_by_camera: HashMap<String, Vec<ParkingSpace>>,
    pub fetched_at: Instant,
}

/// TTL cache over a [`ConfigStore`].
pub struct ConfigCache {
    store: Arc<dyn ConfigStore>,
    ttl: Duration,
    snapshot: RwLock<Option<Arc<ConfigSnapshot>>>,
    /// Single-flight gate: concurrent readers wait for one refresh instead of
    /// each issuing their own store reads.
    refresh_gate: Mutex<()>,
    /// Set by `invalidate()`; forces a refresh on the next read.
    stale: AtomicBool,
    last_attempt: parking_lot::Mutex<Option<Instant>>,
}

impl ConfigCache {
    pub fn new(store: Arc<dyn ConfigStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            snapshot: RwLock::new(None),
            refresh_gate: Mutex::new(()),
            stale: AtomicBool::new(false),
            last_attempt: parking_lot::Mutex::new(None),
        }
    }

    /// Cameras with enabled workers, from the current snapshot.
    ///
    /// Empty only when no refresh has ever succeeded.
    pub async fn active_cameras(&self) -> Vec<CameraConfig> {
        self.ensure_fresh().await;
        self.snapshot.read().await.as_ref().map(|s| s.cameras.clone()).unwrap_or_default()
    }

    /// Spaces belonging to the given camera, from the current snapshot.
    pub async fn spaces_for(&self, camera_id: &str) -> Vec<ParkingSpace> {
        self.ensure_fresh().await;
        self.snapshot
            .read()
            .await
            .as_ref()
            .and_then(|s| s.spaces_by_camera.get(camera_id).cloned())
            .unwrap_or_default()
    }

    /// Force a refresh on the next read.
    pub fn invalidate(&self) {
        self.stale.store(true, Ordering::Relaxed);
    }

    /// Age of the current snapshot, if one exists.
    pub async fn snapshot_age(&self) -> Option<Duration> {
        self.snapshot.read().await.as_ref().map(|s| s.fetched_at.elapsed())
    }

    async fn is_fresh(&self) -> bool {
        if self.stale.load(Ordering::Relaxed) {
            return false;
        }
        match self.snapshot.read().await.as_ref() {
            Some(s) => s.fetched_at.elapsed() < self.ttl,
            None => false,
        }
    }

    async fn ensure_fresh(&self) {
        if self.is_fresh().await {
            return;
        }

        let _gate = self.refresh_gate.lock().await;
        // A racing reader may have refreshed while we waited for the gate.
        if self.is_fresh().await {
            return;
        }

        // Throttle retries after failures: without a fresh snapshot, every
        // read would otherwise hit the store.
        let forced = self.stale.load(Ordering::Relaxed);
        if !forced {
            let attempted_recently = match *self.last_attempt.lock() {
                Some(at) => at.elapsed() < self.ttl,
                None => false,
            };
            if attempted_recently && self.snapshot.read().await.is_none() {
                return;
            }
        }

        *self.last_attempt.lock() = Some(Instant::now());
        self.refresh().await;
        self.stale.store(false, Ordering::Relaxed);
    }

    async fn refresh(&self) {
        match self.fetch_snapshot().await {
            Ok(snapshot) => {
                *self.snapshot.write().await = Some(Arc::new(snapshot));
            }
            Err(e) => {
                let mut guard = self.snapshot.write().await;
                match guard.take() {
                    Some(prev) => {
                        tracing::warn!(err = %e, "config refresh failed, serving previous snapshot");
                        // Re-arm the TTL so reads don't retry per call.
                        *guard = Some(Arc::new(ConfigSnapshot {
                            cameras: prev.cameras.clone(),
                            spaces_by_camera: prev.spaces_by_camera.clone(),
                            fetched_at: Instant::now(),
                        }));
                    }
                    None => {
                        tracing::error!(err = %e, "config refresh failed and no snapshot exists");
                    }
                }
            }
        }
    }

    async fn fetch_snapshot(&self) -> anyhow::Result<ConfigSnapshot> {
        let cameras = self.store.list_active_cameras().await?;

        let mut spaces_by_camera = HashMap::with_capacity(cameras.len());
        for camera in &cameras {
            let spaces = self.store.list_spaces(&camera.id).await?;
            let valid: Vec<ParkingSpace> = spaces
                .into_iter()
                .filter(|space| {
                    if space.bbox.is_valid() {
                        true
                    } else {
                        tracing::error!(
                            space_id = %space.id,
                            camera_id = %camera.id,
                            "invalid normalized bbox, record skipped"
                        );
                        false
                    }
                })
                .collect();
            spaces_by_camera.insert(camera.id.clone(), valid);
        }

        Ok(ConfigSnapshot { cameras, spaces_by_camera, fetched_at: Instant::now() })
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
