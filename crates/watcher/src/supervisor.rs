// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker lifecycle supervisor.
//!
//! Reconciles the set of running camera workers against the cached camera
//! configuration on every refresh interval.  Nothing else may spawn or stop
//! workers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use ab_glyph::FontArc;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::WatchConfig;
use crate::detect::Detector;
use crate::plates::{PlateDirectory, PlateRecognizer};
use crate::publish::FramePublisher;
use crate::store::cache::ConfigCache;
use crate::store::ConfigStore;
use crate::worker::{spawn_worker, WorkerContext, WorkerHandle};

/// Per-camera status record exported over `/api/v1/status`.
#[derive(Debug, Clone, Serialize)]
pub struct CameraStatus {
    pub camera_id: String,
    pub name: String,
    pub worker_enabled: bool,
    pub last_tick_ms: u64,
    pub last_success_ms: u64,
    pub consecutive_failures: u32,
    /// Successful ticks per second, averaged over the last ten seconds.
    pub fps: f64,
    /// Viewer count for this camera's broadcaster, when observable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewers: Option<usize>,
}

/// Single owner of all camera-worker lifecycles.
pub struct Supervisor {
    config: Arc<WatchConfig>,
    cache: Arc<ConfigCache>,
    store: Arc<dyn ConfigStore>,
    detector: Arc<dyn Detector>,
    recognizer: Option<Arc<dyn PlateRecognizer>>,
    plates: Arc<PlateDirectory>,
    publisher: FramePublisher,
    font: Option<FontArc>,
    workers: RwLock<HashMap<String, WorkerHandle>>,
    /// Crash cooldowns: don't respawn a camera before this instant.
    restart_after: parking_lot::Mutex<HashMap<String, Instant>>,
    shutdown: CancellationToken,
}

impl Supervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<WatchConfig>,
        cache: Arc<ConfigCache>,
        store: Arc<dyn ConfigStore>,
        detector: Arc<dyn Detector>,
        recognizer: Option<Arc<dyn PlateRecognizer>>,
        publisher: FramePublisher,
        font: Option<FontArc>,
        shutdown: CancellationToken,
    ) -> Self {
        let plates = Arc::new(PlateDirectory::new(config.plate_queue_capacity));
        Self {
            config,
            cache,
            store,
            detector,
            recognizer,
            plates,
            publisher,
            font,
            workers: RwLock::new(HashMap::new()),
            restart_after: parking_lot::Mutex::new(HashMap::new()),
            shutdown,
        }
    }

    /// Shared per-lot plate queues (external callers enqueue through these).
    pub fn plates(&self) -> Arc<PlateDirectory> {
        Arc::clone(&self.plates)
    }

    /// Spawn the reconciliation loop.
    pub fn spawn_reconcile_loop(self: &Arc<Self>) {
        let supervisor = Arc::clone(self);
        let interval = supervisor.config.cameras_refresh_interval();

        tokio::spawn(async move {
            // Reconcile immediately on startup, then on every interval.
            supervisor.reconcile().await;

            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            timer.tick().await; // consume the immediate first tick

            loop {
                tokio::select! {
                    _ = supervisor.shutdown.cancelled() => break,
                    _ = timer.tick() => {}
                }
                supervisor.reconcile().await;
            }

            supervisor.stop_all().await;
        });
    }

    /// One reconciliation pass: spawn missing workers, stop removed ones,
    /// restart crashed ones after a cooldown, purge stale plates.
    pub async fn reconcile(&self) {
        let cameras = self.cache.active_cameras().await;
        let desired: HashMap<&str, _> = cameras.iter().map(|c| (c.id.as_str(), c)).collect();

        // Decide per worker: keep, stop (removed/disabled/config changed), or
        // recover (the task finished on its own, i.e. crashed).
        enum Action {
            Stop,
            Recover,
        }
        let mut decisions: Vec<(String, Action)> = Vec::new();
        {
            let workers = self.workers.read().await;
            for (id, handle) in workers.iter() {
                match desired.get(id.as_str()) {
                    None => {
                        tracing::info!(camera_id = %id, "camera no longer active, stopping worker");
                        decisions.push((id.clone(), Action::Stop));
                    }
                    Some(camera) if **camera != handle.camera => {
                        tracing::info!(camera_id = %id, "camera config changed, restarting worker");
                        decisions.push((id.clone(), Action::Stop));
                    }
                    Some(_) if handle.join.is_finished() => {
                        decisions.push((id.clone(), Action::Recover));
                    }
                    Some(_) => {}
                }
            }
        }

        let mut to_stop = Vec::new();
        let mut crashed = Vec::new();
        {
            let mut workers = self.workers.write().await;
            for (id, action) in decisions {
                if let Some(handle) = workers.remove(&id) {
                    match action {
                        Action::Stop => to_stop.push(handle),
                        Action::Recover => crashed.push(handle),
                    }
                }
            }
        }

        for handle in to_stop {
            self.stop_worker(handle).await;
        }

        for handle in crashed {
            let camera_id = handle.camera.id.clone();
            match handle.join.await {
                Err(e) if e.is_panic() => {
                    tracing::error!(camera_id = %camera_id, "worker panicked, restarting after cooldown");
                }
                _ => {
                    tracing::error!(camera_id = %camera_id, "worker exited unexpectedly, restarting after cooldown");
                }
            }
            self.restart_after
                .lock()
                .insert(camera_id, Instant::now() + self.config.worker_restart_cooldown());
        }

        // Spawn workers for cameras without one, honoring crash cooldowns.
        {
            let mut workers = self.workers.write().await;
            for camera in &cameras {
                if workers.contains_key(&camera.id) {
                    continue;
                }
                let cooling_down = self
                    .restart_after
                    .lock()
                    .get(&camera.id)
                    .map(|at| Instant::now() < *at)
                    .unwrap_or(false);
                if cooling_down {
                    continue;
                }
                self.restart_after.lock().remove(&camera.id);

                let ctx = WorkerContext {
                    camera: camera.clone(),
                    config: Arc::clone(&self.config),
                    cache: Arc::clone(&self.cache),
                    detector: Arc::clone(&self.detector),
                    recognizer: self.recognizer.clone(),
                    store: Arc::clone(&self.store),
                    plates: self.plates.for_lot(&camera.parking_lot_id),
                    publisher: self.publisher.clone(),
                    font: self.font.clone(),
                };
                let handle = spawn_worker(ctx, &self.shutdown);
                workers.insert(camera.id.clone(), handle);
            }
        }

        self.plates.purge_all(self.config.plate_queue_max_age());
    }

    /// Stop one worker: cancel, await up to the grace period, then abandon.
    async fn stop_worker(&self, handle: WorkerHandle) {
        handle.cancel.cancel();
        let camera_id = handle.camera.id.clone();
        match tokio::time::timeout(self.config.worker_shutdown_timeout(), handle.join).await {
            Ok(_) => tracing::debug!(camera_id = %camera_id, "worker stopped"),
            Err(_) => {
                tracing::warn!(camera_id = %camera_id, "worker did not stop in time, abandoned");
            }
        }
    }

    /// Stop every worker (process shutdown).
    pub async fn stop_all(&self) {
        let handles: Vec<WorkerHandle> = {
            let mut workers = self.workers.write().await;
            workers.drain().map(|(_, handle)| handle).collect()
        };
        for handle in handles {
            self.stop_worker(handle).await;
        }
    }

    pub async fn worker_count(&self) -> usize {
        self.workers.read().await.len()
    }

    /// Status record per live worker.
    pub async fn statuses(&self) -> Vec<CameraStatus> {
        let snapshot: Vec<(CameraStatus, String)> = {
            let workers = self.workers.read().await;
            workers
                .values()
                .map(|handle| {
                    (
                        CameraStatus {
                            camera_id: handle.camera.id.clone(),
                            name: handle.camera.name.clone(),
                            worker_enabled: handle.camera.worker_enabled,
                            last_tick_ms: handle.status.last_tick_ms(),
                            last_success_ms: handle.status.last_success_ms(),
                            consecutive_failures: handle.status.consecutive_failures(),
                            fps: handle.status.fps(),
                            viewers: None,
                        },
                        handle.camera.id.clone(),
                    )
                })
                .collect()
        };

        let mut statuses = Vec::with_capacity(snapshot.len());
        for (mut status, camera_id) in snapshot {
            status.viewers = self.publisher.viewer_count(&camera_id).await;
            statuses.push(status);
        }
        statuses.sort_by(|a, b| a.camera_id.cmp(&b.camera_id));
        statuses
    }
}
