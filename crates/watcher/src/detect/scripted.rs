// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic detector that replays a prepared per-frame script.
//! Drives the scenario tests in place of a real inference service.

use std::collections::VecDeque;

use async_trait::async_trait;

use super::{DetectOptions, Detection, Detector, Frame};

/// Replays one prepared detection list per `detect` call, in order.  Once the
/// script is exhausted every call returns no detections.
#[derive(Default)]
pub struct ScriptedDetector {
    frames: parking_lot::Mutex<VecDeque<Vec<Detection>>>,
}

impl ScriptedDetector {
    pub fn new(frames: Vec<Vec<Detection>>) -> Self {
        Self { frames: parking_lot::Mutex::new(frames.into()) }
    }

    /// Append one frame's detections to the script.
    pub fn push(&self, detections: Vec<Detection>) {
        self.frames.lock().push_back(detections);
    }

    /// Remaining scripted frames.
    pub fn remaining(&self) -> usize {
        self.frames.lock().len()
    }
}

#[async_trait]
impl Detector for ScriptedDetector {
    async fn detect(&self, _frame: &Frame, _opts: &DetectOptions) -> anyhow::Result<Vec<Detection>> {
        Ok(self.frames.lock().pop_front().unwrap_or_default())
    }
}

#[cfg(test)]
#[path = "scripted_tests.rs"]
mod tests;
