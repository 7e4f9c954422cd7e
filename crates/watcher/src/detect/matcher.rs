// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure detection-to-space matcher.
//!
//! Greedy assignment by descending overlap score.  No I/O, no hidden state:
//! identical inputs produce identical outputs, and permuting the detection
//! list never changes the occupancy map or the matched set.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::geometry;
use crate::store::ParkingSpace;
use parkhub::wire::MatchedPair;

use super::Detection;

/// Overlap metric used to score a (detection, space) candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum MatchMetric {
    /// Intersection over union.
    #[default]
    Iou,
    /// Intersection over detection area.
    Ioa,
}

/// Matcher parameters, fixed per deployment.
#[derive(Debug, Clone, Copy)]
pub struct MatchParams {
    pub metric: MatchMetric,
    pub threshold: f32,
}

impl Default for MatchParams {
    fn default() -> Self {
        Self { metric: MatchMetric::Iou, threshold: 0.5 }
    }
}

/// Per-space result of one matching pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SpaceOccupancy {
    pub space_id: String,
    pub occupied: bool,
    /// Index into the input detections slice, when occupied.
    pub detection: Option<usize>,
}

/// Full matcher output: one entry per input space, in input order, plus the
/// selected (detection, space) pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchOutcome {
    pub spaces: Vec<SpaceOccupancy>,
    pub pairs: Vec<MatchedPair>,
}

impl MatchOutcome {
    /// Number of occupied spaces in this pass.
    pub fn occupied_count(&self) -> usize {
        self.spaces.iter().filter(|s| s.occupied).count()
    }
}

/// Match detections against parking spaces.
///
/// Only detections whose class is in `vehicle_classes` participate.  A
/// candidate requires `metric >= threshold`; assignment is greedy by
/// descending score with ties broken by detection confidence, then by lower
/// detection index.
pub fn match_spaces(
    detections: &[Detection],
    spaces: &[ParkingSpace],
    frame_w: u32,
    frame_h: u32,
    params: &MatchParams,
    vehicle_classes: &HashSet<String>,
) -> MatchOutcome {
    let normalized: Vec<_> = detections
        .iter()
        .map(|d| geometry::to_norm(&d.bbox, frame_w, frame_h))
        .collect();

    // All candidate pairs over the threshold.
    let mut candidates: Vec<Candidate> = Vec::new();
    for (space_idx, space) in spaces.iter().enumerate() {
        for (det_idx, detection) in detections.iter().enumerate() {
            if !vehicle_classes.contains(&detection.class) {
                continue;
            }
            let det_box = &normalized[det_idx];
            let score = match params.metric {
                MatchMetric::Iou => geometry::iou(det_box, &space.bbox),
                MatchMetric::Ioa => geometry::ioa(det_box, &space.bbox),
            };
            if score >= params.threshold {
                candidates.push(Candidate {
                    score,
                    confidence: detection.confidence,
                    det_idx,
                    space_idx,
                });
            }
        }
    }

    // Highest score first; ties by confidence, then lower detection index,
    // then lower space index.
    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(b.confidence.total_cmp(&a.confidence))
            .then(a.det_idx.cmp(&b.det_idx))
            .then(a.space_idx.cmp(&b.space_idx))
    });

    let mut det_taken = vec![false; detections.len()];
    let mut space_assignment: Vec<Option<usize>> = vec![None; spaces.len()];
    let mut pairs = Vec::new();

    for candidate in &candidates {
        if det_taken[candidate.det_idx] || space_assignment[candidate.space_idx].is_some() {
            continue;
        }
        det_taken[candidate.det_idx] = true;
        space_assignment[candidate.space_idx] = Some(candidate.det_idx);
        pairs.push(MatchedPair {
            detection: candidate.det_idx,
            space: spaces[candidate.space_idx].id.clone(),
        });
    }

    let space_results = spaces
        .iter()
        .zip(&space_assignment)
        .map(|(space, assigned)| SpaceOccupancy {
            space_id: space.id.clone(),
            occupied: assigned.is_some(),
            detection: *assigned,
        })
        .collect();

    MatchOutcome { spaces: space_results, pairs }
}

struct Candidate {
    score: f32,
    confidence: f32,
    det_idx: usize,
    space_idx: usize,
}

#[cfg(test)]
#[path = "matcher_tests.rs"]
mod tests;
