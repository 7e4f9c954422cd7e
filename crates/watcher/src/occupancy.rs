// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-space occupancy state machine and rate-limited persistence.
//!
//! Each space is FREE or OCCUPIED.  Occupation is immediate; vacating is
//! debounced: a space must go unmatched for `free_debounce_frames`
//! consecutive frames before it transitions back to FREE, so one missed
//! detection never flaps the state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::detect::matcher::MatchOutcome;
use crate::detect::Detection;
use crate::plates::PlateQueue;
use crate::store::{ConfigStore, OccupancyUpdate};

/// Mutable per-space state owned by one camera's tracker.
#[derive(Debug, Clone, Default)]
pub struct SpaceState {
    pub occupied: bool,
    pub missed_frames: u32,
    pub plate: Option<String>,
    pub track_id: Option<u64>,
}

/// Transition events emitted by [`OccupancyTracker::observe`].
#[derive(Debug, Clone, PartialEq)]
pub enum OccupancyEvent {
    NewOccupation {
        space_id: String,
        track_id: Option<u64>,
        plate: Option<String>,
        timestamp_ms: u64,
    },
    Vacated {
        space_id: String,
        timestamp_ms: u64,
    },
}

/// Per-camera occupancy FSM.  Exclusively owned by that camera's worker.
pub struct OccupancyTracker {
    camera_id: String,
    free_debounce_frames: u32,
    plates: Arc<PlateQueue>,
    states: HashMap<String, SpaceState>,
}

impl OccupancyTracker {
    pub fn new(camera_id: impl Into<String>, free_debounce_frames: u32, plates: Arc<PlateQueue>) -> Self {
        Self {
            camera_id: camera_id.into(),
            free_debounce_frames: free_debounce_frames.max(1),
            plates,
            states: HashMap::new(),
        }
    }

    /// Apply one frame's matching result, returning the transitions it caused.
    pub fn observe(
        &mut self,
        outcome: &MatchOutcome,
        detections: &[Detection],
        timestamp_ms: u64,
    ) -> Vec<OccupancyEvent> {
        let mut events = Vec::new();

        for space in &outcome.spaces {
            let state = self.states.entry(space.space_id.clone()).or_default();
            let matched_track =
                space.detection.and_then(|idx| detections.get(idx)).and_then(|d| d.track_id);

            match (state.occupied, space.occupied) {
                (false, true) => {
                    // Occupation is immediate.
                    state.occupied = true;
                    state.missed_frames = 0;
                    state.track_id = matched_track;
                    state.plate = self.plates.claim_newest().map(|entry| entry.text);
                    tracing::info!(
                        camera_id = %self.camera_id,
                        space_id = %space.space_id,
                        track_id = ?state.track_id,
                        plate = ?state.plate,
                        "space occupied"
                    );
                    events.push(OccupancyEvent::NewOccupation {
                        space_id: space.space_id.clone(),
                        track_id: state.track_id,
                        plate: state.plate.clone(),
                        timestamp_ms,
                    });
                }
                (true, true) => {
                    state.missed_frames = 0;
                    // Adopt a track id if one appears later; never overwrite
                    // an existing plate.
                    if state.track_id.is_none() {
                        state.track_id = matched_track;
                    }
                }
                (true, false) => {
                    state.missed_frames += 1;
                    if state.missed_frames >= self.free_debounce_frames {
                        state.occupied = false;
                        state.missed_frames = 0;
                        state.plate = None;
                        state.track_id = None;
                        tracing::info!(
                            camera_id = %self.camera_id,
                            space_id = %space.space_id,
                            "space vacated"
                        );
                        events.push(OccupancyEvent::Vacated {
                            space_id: space.space_id.clone(),
                            timestamp_ms,
                        });
                    }
                }
                (false, false) => {}
            }
        }

        // Drop state for spaces removed from the configuration.
        if self.states.len() > outcome.spaces.len() {
            let live: std::collections::HashSet<&str> =
                outcome.spaces.iter().map(|s| s.space_id.as_str()).collect();
            self.states.retain(|id, _| live.contains(id.as_str()));
        }

        events
    }

    /// Current state for a space, if this tracker has seen it.
    pub fn state(&self, space_id: &str) -> Option<&SpaceState> {
        self.states.get(space_id)
    }

    /// Number of spaces currently OCCUPIED.
    pub fn occupied_count(&self) -> usize {
        self.states.values().filter(|s| s.occupied).count()
    }
}

// -- Persistence --------------------------------------------------------------

/// Coalescing, rate-limited occupancy writer.
///
/// At most one store write per space per `min_interval`; bursts overwrite the
/// pending update instead of amplifying into extra writes.  Writes are
/// best-effort: failures are logged and the update is dropped.
pub struct OccupancyPersister {
    store: Arc<dyn ConfigStore>,
    min_interval: Duration,
    pending: HashMap<String, OccupancyUpdate>,
    last_write: HashMap<String, Instant>,
}

impl OccupancyPersister {
    pub fn new(store: Arc<dyn ConfigStore>, min_interval: Duration) -> Self {
        Self { store, min_interval, pending: HashMap::new(), last_write: HashMap::new() }
    }

    /// Queue an update for a space, replacing any pending one.
    pub fn queue(&mut self, space_id: impl Into<String>, update: OccupancyUpdate) {
        self.pending.insert(space_id.into(), update);
    }

    /// Write out pending updates whose per-space interval has elapsed.
    pub async fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        let due: Vec<String> = self
            .pending
            .keys()
            .filter(|id| {
                self.last_write
                    .get(*id)
                    .map(|at| at.elapsed() >= self.min_interval)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();

        for space_id in due {
            let Some(update) = self.pending.remove(&space_id) else { continue };
            match self.store.update_space_occupancy(&space_id, &update).await {
                Ok(()) => {
                    self.last_write.insert(space_id, Instant::now());
                }
                Err(e) => {
                    tracing::warn!(space_id = %space_id, err = %e, "occupancy persist failed");
                }
            }
        }
    }

    /// Updates waiting on their rate-limit window.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
#[path = "occupancy_tests.rs"]
mod tests;
