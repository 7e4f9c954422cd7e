// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-camera fan-out hub.
//!
//! A `Broadcaster` holds the latest annotated frame + metadata and fans
//! updates out to viewers over a `tokio::sync::broadcast` channel.  Delivery
//! is lossy by design: a viewer that falls behind observes `Lagged` and skips
//! straight to the newest frame.  `publish` never blocks on viewers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::broadcast;

use crate::state::epoch_ms;
use crate::wire::BroadcastMetadata;

/// Fan-out channel depth.  Small on purpose: viewers that lag further than
/// this skip to the latest frame rather than queueing stale ones.
const CHANNEL_CAPACITY: usize = 4;

/// One published frame with its metadata and monotonic sequence number.
#[derive(Debug, Clone)]
pub struct FrameUpdate {
    pub frame: Bytes,
    pub metadata: BroadcastMetadata,
    pub frame_count: u64,
    pub timestamp_ms: u64,
}

/// Per-camera broadcaster: latest-frame slot plus viewer fan-out.
pub struct Broadcaster {
    camera_id: String,
    tx: broadcast::Sender<Arc<FrameUpdate>>,
    latest: parking_lot::RwLock<Option<Arc<FrameUpdate>>>,
    frame_count: AtomicU64,
    last_publish_ms: AtomicU64,
}

impl Broadcaster {
    pub fn new(camera_id: impl Into<String>) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            camera_id: camera_id.into(),
            tx,
            latest: parking_lot::RwLock::new(None),
            frame_count: AtomicU64::new(0),
            // A broadcaster that never publishes still ages out of the
            // registry, counted from creation.
            last_publish_ms: AtomicU64::new(epoch_ms()),
        }
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    /// Atomically replace the latest frame and fan out to current viewers.
    ///
    /// Returns the number of connected viewers.  Never blocks: sends go into
    /// each viewer's broadcast slot and slow viewers drop intermediate frames.
    pub fn publish(&self, frame: Bytes, metadata: BroadcastMetadata) -> usize {
        let count = self.frame_count.fetch_add(1, Ordering::Relaxed) + 1;
        let update = Arc::new(FrameUpdate {
            frame,
            metadata,
            frame_count: count,
            timestamp_ms: epoch_ms(),
        });
        *self.latest.write() = Some(Arc::clone(&update));
        self.last_publish_ms.store(update.timestamp_ms, Ordering::Relaxed);
        // Err means no live receivers, which is fine.
        let _ = self.tx.send(update);
        self.tx.receiver_count()
    }

    /// Register a viewer.  Returns the current frame (if any) to prime the
    /// stream, plus the live receiver.
    pub fn subscribe(&self) -> (Option<Arc<FrameUpdate>>, broadcast::Receiver<Arc<FrameUpdate>>) {
        // Subscribe before snapshotting so a publish racing this call is
        // either in the snapshot or on the channel.
        let rx = self.tx.subscribe();
        let primed = self.latest.read().clone();
        (primed, rx)
    }

    /// Latest published frame, if any.
    pub fn latest(&self) -> Option<Arc<FrameUpdate>> {
        self.latest.read().clone()
    }

    pub fn viewer_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::Relaxed)
    }

    pub fn last_publish_ms(&self) -> u64 {
        self.last_publish_ms.load(Ordering::Relaxed)
    }

    /// Whether this broadcaster has no viewers and has not published within
    /// `idle_ttl`, making it eligible for the periodic sweep.
    pub fn is_idle(&self, idle_ttl: Duration) -> bool {
        if self.viewer_count() > 0 {
            return false;
        }
        let idle_ms = epoch_ms().saturating_sub(self.last_publish_ms());
        idle_ms >= idle_ttl.as_millis() as u64
    }
}

#[cfg(test)]
#[path = "broadcaster_tests.rs"]
mod tests;
