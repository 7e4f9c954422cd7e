// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::broadcaster::Broadcaster;
use crate::config::HubConfig;

/// Shared hub state: the per-camera broadcaster registry.
pub struct HubState {
    broadcasters: RwLock<HashMap<String, Arc<Broadcaster>>>,
    pub config: HubConfig,
    pub shutdown: CancellationToken,
}

impl HubState {
    pub fn new(config: HubConfig, shutdown: CancellationToken) -> Self {
        Self { broadcasters: RwLock::new(HashMap::new()), config, shutdown }
    }

    /// Look up the broadcaster for a camera, creating it lazily.
    ///
    /// Broadcasters come into existence on first publish or first subscribe,
    /// whichever happens first.
    pub async fn get_or_create(&self, camera_id: &str) -> Arc<Broadcaster> {
        {
            let guard = self.broadcasters.read().await;
            if let Some(b) = guard.get(camera_id) {
                return Arc::clone(b);
            }
        }

        let mut guard = self.broadcasters.write().await;
        // Double-check after acquiring the write lock.
        if let Some(b) = guard.get(camera_id) {
            return Arc::clone(b);
        }
        let b = Arc::new(Broadcaster::new(camera_id));
        guard.insert(camera_id.to_owned(), Arc::clone(&b));
        tracing::debug!(camera_id, "broadcaster created");
        b
    }

    pub async fn get(&self, camera_id: &str) -> Option<Arc<Broadcaster>> {
        self.broadcasters.read().await.get(camera_id).map(Arc::clone)
    }

    pub async fn broadcaster_count(&self) -> usize {
        self.broadcasters.read().await.len()
    }

    /// Total connected viewers across all cameras.
    pub async fn viewer_count(&self) -> usize {
        self.broadcasters.read().await.values().map(|b| b.viewer_count()).sum()
    }

    /// Remove broadcasters with zero viewers and no publish within the idle
    /// TTL.  Returns the ids of the removed cameras.
    pub async fn sweep_idle(&self) -> Vec<String> {
        let idle_ttl = self.config.broadcaster_idle_ttl();
        let mut guard = self.broadcasters.write().await;
        let idle: Vec<String> =
            guard.iter().filter(|(_, b)| b.is_idle(idle_ttl)).map(|(k, _)| k.clone()).collect();
        for camera_id in &idle {
            guard.remove(camera_id);
        }
        idle
    }
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
