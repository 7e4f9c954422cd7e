// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic sweep that removes idle broadcasters.

use std::sync::Arc;

use crate::state::HubState;

/// Spawn a background task that periodically evicts broadcasters with no
/// viewers and no recent publishes.
pub fn spawn_idle_sweep(state: Arc<HubState>) {
    let interval = state.config.sweep_interval();

    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }

            let removed = state.sweep_idle().await;
            for camera_id in &removed {
                tracing::info!(camera_id = %camera_id, "idle broadcaster removed");
            }
        }
    });
}
