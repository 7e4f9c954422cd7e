// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-camera worker: one logical task owning the whole pipeline for one
//! camera — fetch, decode, detect+track, match, occupancy, annotate, encode,
//! publish.  Forward progress is preferred over completeness: a failed tick
//! is never retried.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ab_glyph::FontArc;
use anyhow::Context as _;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use parkhub::state::epoch_ms;
use parkhub::wire::{BroadcastMetadata, DetectionInfo, SpaceStatus};

use crate::annotate::{encode_jpeg, Annotator, SpaceRender};
use crate::config::WatchConfig;
use crate::detect::matcher::{match_spaces, MatchOutcome, MatchParams};
use crate::detect::{DetectOptions, Detection, Detector, Frame};
use crate::fetch::FrameFetcher;
use crate::geometry;
use crate::occupancy::{OccupancyEvent, OccupancyPersister, OccupancyTracker};
use crate::plates::{PlateQueue, PlateRecognizer};
use crate::publish::FramePublisher;
use crate::store::cache::ConfigCache;
use crate::store::{CameraConfig, CameraKind, ConfigStore, OccupancyUpdate, ParkingSpace};

/// Moving-average window for the status FPS figure.
const FPS_WINDOW: Duration = Duration::from_secs(10);

/// Everything a worker needs, handed over at spawn.  The worker exclusively
/// owns all mutable pipeline state; these are its only outward edges.
pub struct WorkerContext {
    pub camera: CameraConfig,
    pub config: Arc<WatchConfig>,
    pub cache: Arc<ConfigCache>,
    pub detector: Arc<dyn Detector>,
    pub recognizer: Option<Arc<dyn PlateRecognizer>>,
    pub store: Arc<dyn ConfigStore>,
    pub plates: Arc<PlateQueue>,
    pub publisher: FramePublisher,
    pub font: Option<FontArc>,
}

/// Shared, read-mostly status record exported by the supervisor.
pub struct WorkerStatus {
    camera_id: String,
    last_tick_ms: AtomicU64,
    last_success_ms: AtomicU64,
    consecutive_failures: AtomicU32,
    successes: parking_lot::Mutex<VecDeque<Instant>>,
}

impl WorkerStatus {
    fn new(camera_id: impl Into<String>) -> Self {
        Self {
            camera_id: camera_id.into(),
            last_tick_ms: AtomicU64::new(0),
            last_success_ms: AtomicU64::new(0),
            consecutive_failures: AtomicU32::new(0),
            successes: parking_lot::Mutex::new(VecDeque::new()),
        }
    }

    fn record_tick(&self) {
        self.last_tick_ms.store(epoch_ms(), Ordering::Relaxed);
    }

    fn record_success(&self) {
        self.last_success_ms.store(epoch_ms(), Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        let mut successes = self.successes.lock();
        successes.push_back(Instant::now());
        while successes.front().map(|at| at.elapsed() > FPS_WINDOW).unwrap_or(false) {
            successes.pop_front();
        }
    }

    fn record_failure(&self) -> u32 {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn last_tick_ms(&self) -> u64 {
        self.last_tick_ms.load(Ordering::Relaxed)
    }

    pub fn last_success_ms(&self) -> u64 {
        self.last_success_ms.load(Ordering::Relaxed)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Successful ticks per second over the last ten seconds.
    pub fn fps(&self) -> f64 {
        let successes = self.successes.lock();
        let recent = successes.iter().filter(|at| at.elapsed() <= FPS_WINDOW).count();
        recent as f64 / FPS_WINDOW.as_secs_f64()
    }
}

/// Handle held by the supervisor, the single owner of worker lifecycles.
pub struct WorkerHandle {
    pub camera: CameraConfig,
    pub cancel: CancellationToken,
    pub status: Arc<WorkerStatus>,
    pub join: JoinHandle<()>,
}

/// Spawn the worker task for one camera.
pub fn spawn_worker(ctx: WorkerContext, shutdown: &CancellationToken) -> WorkerHandle {
    let cancel = shutdown.child_token();
    let status = Arc::new(WorkerStatus::new(&ctx.camera.id));
    let camera = ctx.camera.clone();
    let join = tokio::spawn(run_worker(ctx, cancel.clone(), Arc::clone(&status)));
    tracing::info!(camera_id = %camera.id, name = %camera.name, "camera worker started");
    WorkerHandle { camera, cancel, status, join }
}

/// Mutable per-camera pipeline state, owned by the worker task alone.
struct Pipeline {
    opts: DetectOptions,
    params: MatchParams,
    classes: HashSet<String>,
    tracker: OccupancyTracker,
    annotator: Annotator,
    persister: OccupancyPersister,
    last_ocr: Option<Instant>,
}

async fn run_worker(ctx: WorkerContext, cancel: CancellationToken, status: Arc<WorkerStatus>) {
    let fetcher = FrameFetcher::new(ctx.camera.snapshot_url.clone(), ctx.config.fetch_timeout());
    let period = ctx.config.frame_period(ctx.camera.fps_override);

    let mut pipeline = Pipeline {
        opts: ctx.config.detect_options(),
        params: ctx.config.match_params(),
        classes: ctx.config.vehicle_set(),
        tracker: OccupancyTracker::new(
            &ctx.camera.id,
            ctx.config.free_debounce_frames,
            Arc::clone(&ctx.plates),
        ),
        annotator: Annotator::new(ctx.font.clone(), ctx.config.trail_length),
        persister: OccupancyPersister::new(
            Arc::clone(&ctx.store),
            ctx.config.occupancy_persist_min_interval(),
        ),
        last_ocr: None,
    };

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let started = Instant::now();
        status.record_tick();

        match run_tick(&ctx, &fetcher, &mut pipeline).await {
            Ok(()) => status.record_success(),
            Err(e) => {
                let failures = status.record_failure();
                tracing::warn!(
                    camera_id = %ctx.camera.id,
                    failures,
                    err = %e,
                    "worker tick failed"
                );
            }
        }

        pipeline.persister.flush().await;

        // Admission gate: sleep out the remainder of the frame period, or the
        // back-off spacing while the camera is unreachable.
        let failures = status.consecutive_failures();
        let wait = if failures >= ctx.config.max_consecutive_fetch_failures {
            ctx.config.fetch_backoff()
        } else {
            period.saturating_sub(started.elapsed())
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
    }

    tracing::info!(camera_id = %ctx.camera.id, "camera worker stopped");
}

async fn run_tick(
    ctx: &WorkerContext,
    fetcher: &FrameFetcher,
    pipeline: &mut Pipeline,
) -> anyhow::Result<()> {
    let jpeg = fetcher.fetch().await.context("fetch")?;
    let mut frame = Frame::decode(jpeg).context("decode")?;
    let detections = ctx.detector.detect(&frame, &pipeline.opts).await.context("detect")?;

    let spaces = ctx.cache.spaces_for(&ctx.camera.id).await;
    let outcome = match_spaces(
        &detections,
        &spaces,
        frame.width,
        frame.height,
        &pipeline.params,
        &pipeline.classes,
    );

    let now_ms = epoch_ms();
    let events = pipeline.tracker.observe(&outcome, &detections, now_ms);
    for event in &events {
        match event {
            OccupancyEvent::NewOccupation { space_id, track_id, plate, timestamp_ms } => {
                pipeline.persister.queue(
                    space_id.clone(),
                    OccupancyUpdate {
                        occupied: true,
                        plate: plate.clone(),
                        track_id: *track_id,
                        timestamp_ms: *timestamp_ms,
                    },
                );
            }
            OccupancyEvent::Vacated { space_id, timestamp_ms } => {
                pipeline.persister.queue(
                    space_id.clone(),
                    OccupancyUpdate {
                        occupied: false,
                        plate: None,
                        track_id: None,
                        timestamp_ms: *timestamp_ms,
                    },
                );
            }
        }
    }

    if ctx.camera.kind == CameraKind::Barrier {
        maybe_recognize_plates(ctx, pipeline, &frame, &detections).await;
    }

    let (metadata, renders) = build_frame_outputs(pipeline, &detections, &spaces, &outcome, now_ms);

    pipeline.annotator.annotate(
        &mut frame.image,
        &detections,
        &renders,
        &ctx.camera.barrier_zones,
    );

    // Encode and publish failures drop this frame only; the tick still counts
    // as a success for cadence purposes.
    let encoded = match encode_jpeg(&frame.image, ctx.config.jpeg_quality) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(camera_id = %ctx.camera.id, err = %e, "frame encode failed, dropped");
            return Ok(());
        }
    };

    let publish = ctx.publisher.publish(&ctx.camera.id, encoded, metadata);
    match tokio::time::timeout(ctx.config.publish_timeout(), publish).await {
        Ok(Ok(viewers)) => {
            tracing::trace!(camera_id = %ctx.camera.id, viewers, "frame published");
        }
        Ok(Err(e)) => {
            tracing::warn!(camera_id = %ctx.camera.id, err = %e, "publish failed, frame dropped");
        }
        Err(_) => {
            tracing::warn!(camera_id = %ctx.camera.id, "publish timed out, frame dropped");
        }
    }

    Ok(())
}

/// Run plate OCR on a barrier camera when a vehicle is at the barrier.
///
/// Gated by the per-camera OCR interval and, when barrier zones are
/// configured, by an IoA test against them.
async fn maybe_recognize_plates(
    ctx: &WorkerContext,
    pipeline: &mut Pipeline,
    frame: &Frame,
    detections: &[Detection],
) {
    let Some(ref recognizer) = ctx.recognizer else { return };

    if let Some(at) = pipeline.last_ocr {
        if at.elapsed() < ctx.config.plate_ocr_min_interval() {
            return;
        }
    }

    let at_barrier = detections.iter().any(|d| {
        if !pipeline.classes.contains(&d.class) {
            return false;
        }
        if ctx.camera.barrier_zones.is_empty() {
            return true;
        }
        let det_box = geometry::to_norm(&d.bbox, frame.width, frame.height);
        ctx.camera
            .barrier_zones
            .iter()
            .any(|zone| geometry::ioa(&det_box, zone) >= pipeline.params.threshold)
    });
    if !at_barrier {
        return;
    }

    pipeline.last_ocr = Some(Instant::now());
    match recognizer.recognize(frame).await {
        Ok(readings) => {
            for reading in readings {
                tracing::info!(
                    camera_id = %ctx.camera.id,
                    plate = %reading.text,
                    confidence = reading.confidence,
                    "plate recognized"
                );
                ctx.plates.enqueue(reading.text, reading.confidence, Instant::now());
            }
        }
        Err(e) => {
            tracing::warn!(camera_id = %ctx.camera.id, err = %e, "plate recognition failed");
        }
    }
}

/// Assemble the broadcast metadata and the annotator's space renders.
///
/// Occupancy comes from the FSM, not the raw matcher output, so debounced
/// spaces stay red while briefly unmatched.
fn build_frame_outputs(
    pipeline: &Pipeline,
    detections: &[Detection],
    spaces: &[ParkingSpace],
    outcome: &MatchOutcome,
    now_ms: u64,
) -> (BroadcastMetadata, Vec<SpaceRender>) {
    let det_space: HashMap<usize, &str> =
        outcome.pairs.iter().map(|p| (p.detection, p.space.as_str())).collect();

    let mut spaces_meta = Vec::with_capacity(spaces.len());
    let mut renders = Vec::with_capacity(spaces.len());
    for space in spaces {
        let state = pipeline.tracker.state(&space.id);
        let occupied = state.map(|s| s.occupied).unwrap_or(false);
        let plate = state.and_then(|s| s.plate.clone());
        spaces_meta.push(SpaceStatus {
            id: space.id.clone(),
            name: space.name.clone(),
            occupied,
            bbox: space.bbox,
            plate: plate.clone(),
        });
        renders.push(SpaceRender { name: space.name.clone(), bbox: space.bbox, occupied, plate });
    }

    let detections_meta = detections
        .iter()
        .enumerate()
        .map(|(idx, d)| DetectionInfo {
            class: d.class.clone(),
            confidence: d.confidence,
            bbox: d.bbox,
            track_id: d.track_id,
            plate: det_space
                .get(&idx)
                .and_then(|space_id| pipeline.tracker.state(space_id))
                .and_then(|s| s.plate.clone()),
        })
        .collect();

    let metadata = BroadcastMetadata {
        vehicle_count: detections.iter().filter(|d| pipeline.classes.contains(&d.class)).count(),
        occupied_spaces: spaces_meta.iter().filter(|s| s.occupied).count(),
        total_spaces: spaces_meta.len(),
        spaces: spaces_meta,
        detections: detections_meta,
        matches: outcome.pairs.clone(),
        tracking_enabled: pipeline.opts.tracking,
        timestamp_ms: now_ms,
    };

    (metadata, renders)
}
