// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-lot license-plate queue.
//!
//! Barrier-camera workers (and external callers) enqueue recently recognized
//! plates; regular-camera workers claim them on new occupations.  The queue
//! is a bounded history with one-shot consumption, newest first.  A coarse
//! per-queue lock is enough: traffic is bounded by the plate-OCR rate.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use parkhub::wire::PixelBox;

use crate::detect::Frame;

/// One recognized plate awaiting assignment.
#[derive(Debug, Clone)]
pub struct PlateEntry {
    pub text: String,
    pub confidence: f32,
    pub detected_at: Instant,
    pub assigned: bool,
}

/// Bounded per-lot FIFO of recent plates.
pub struct PlateQueue {
    capacity: usize,
    entries: parking_lot::Mutex<VecDeque<PlateEntry>>,
}

impl PlateQueue {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), entries: parking_lot::Mutex::new(VecDeque::new()) }
    }

    /// Append a plate; evicts the oldest entry when over capacity.
    pub fn enqueue(&self, text: impl Into<String>, confidence: f32, detected_at: Instant) {
        let mut entries = self.entries.lock();
        entries.push_back(PlateEntry {
            text: text.into(),
            confidence,
            detected_at,
            assigned: false,
        });
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// Claim the most recent unassigned plate, marking it assigned.
    ///
    /// One-shot: a claimed entry is never returned again.  Returns `None`
    /// when every entry is already assigned or the queue is empty.
    pub fn claim_newest(&self) -> Option<PlateEntry> {
        let mut entries = self.entries.lock();
        for entry in entries.iter_mut().rev() {
            if !entry.assigned {
                entry.assigned = true;
                return Some(entry.clone());
            }
        }
        None
    }

    /// Drop entries older than `max_age`, assigned or not.
    pub fn purge(&self, max_age: Duration) {
        let mut entries = self.entries.lock();
        entries.retain(|e| e.detected_at.elapsed() < max_age);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Hands out the shared per-lot plate queues.
pub struct PlateDirectory {
    capacity: usize,
    queues: parking_lot::RwLock<HashMap<String, Arc<PlateQueue>>>,
}

impl PlateDirectory {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, queues: parking_lot::RwLock::new(HashMap::new()) }
    }

    /// Queue for a parking lot, created on first use.
    pub fn for_lot(&self, parking_lot_id: &str) -> Arc<PlateQueue> {
        {
            let queues = self.queues.read();
            if let Some(q) = queues.get(parking_lot_id) {
                return Arc::clone(q);
            }
        }
        let mut queues = self.queues.write();
        Arc::clone(
            queues
                .entry(parking_lot_id.to_owned())
                .or_insert_with(|| Arc::new(PlateQueue::new(self.capacity))),
        )
    }

    /// Purge every lot's queue.
    pub fn purge_all(&self, max_age: Duration) {
        for queue in self.queues.read().values() {
            queue.purge(max_age);
        }
    }
}

/// One OCR reading from a barrier-camera frame.
#[derive(Debug, Clone)]
pub struct PlateReading {
    pub text: String,
    pub confidence: f32,
    pub bbox: PixelBox,
}

/// License-plate OCR contract, invoked only from barrier-camera workers.
#[async_trait]
pub trait PlateRecognizer: Send + Sync {
    async fn recognize(&self, frame: &Frame) -> anyhow::Result<Vec<PlateReading>>;
}

/// OCR backed by a remote recognition service.
pub struct HttpPlateRecognizer {
    base_url: String,
    client: reqwest::Client,
}

impl HttpPlateRecognizer {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { base_url: base_url.into(), client }
    }
}

#[derive(Debug, serde::Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    plates: Vec<WirePlate>,
}

#[derive(Debug, serde::Deserialize)]
struct WirePlate {
    text: String,
    confidence: f32,
    bbox: PixelBox,
}

#[async_trait]
impl PlateRecognizer for HttpPlateRecognizer {
    async fn recognize(&self, frame: &Frame) -> anyhow::Result<Vec<PlateReading>> {
        let url = format!("{}/api/v1/plates", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(frame.jpeg.clone())
            .send()
            .await?
            .error_for_status()?;
        let body: RecognizeResponse = resp.json().await?;
        Ok(body
            .plates
            .into_iter()
            .map(|p| PlateReading { text: p.text, confidence: p.confidence, bbox: p.bbox })
            .collect())
    }
}

#[cfg(test)]
#[path = "plates_tests.rs"]
mod tests;
