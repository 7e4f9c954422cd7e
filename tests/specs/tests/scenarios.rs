// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end pipeline scenarios: supervisor reconciliation, the full
//! fetch→detect→match→occupancy→annotate→publish loop, and the debounce and
//! plate-carryover timelines.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use parkhub::config::HubConfig;
use parkhub::state::HubState;
use parkhub::wire::{NormBox, PixelBox};
use parkwatch::config::WatchConfig;
use parkwatch::detect::matcher::{match_spaces, MatchParams};
use parkwatch::detect::{Detection, NullDetector};
use parkwatch::occupancy::OccupancyTracker;
use parkwatch::plates::PlateDirectory;
use parkwatch::publish::FramePublisher;
use parkwatch::store::memory::MemoryStore;

use parkwatch::detect::scripted::ScriptedDetector;
use parkwatch_specs::{camera, ensure_crypto, space, start_supervisor, wait_for, CameraFixture};

const WAIT: Duration = Duration::from_secs(5);

fn fast_config() -> WatchConfig {
    WatchConfig {
        cameras_refresh_interval_ms: 150,
        target_fps: 20.0,
        fetch_timeout_ms: 1000,
        ..WatchConfig::default()
    }
}

fn local_hub(shutdown: &CancellationToken) -> Arc<HubState> {
    Arc::new(HubState::new(HubConfig::default(), shutdown.clone()))
}

// -- S1 + S5: supervisor reconciliation ---------------------------------------

#[tokio::test]
async fn supervisor_tracks_camera_enablement() -> anyhow::Result<()> {
    ensure_crypto();
    let store = Arc::new(MemoryStore::new());
    let shutdown = CancellationToken::new();
    let hub = local_hub(&shutdown);

    let (supervisor, _cache, _token) = start_supervisor(
        fast_config(),
        Arc::clone(&store),
        Arc::new(NullDetector),
        FramePublisher::local(Arc::clone(&hub)),
    );

    // Cold start: no cameras, no workers.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(supervisor.worker_count().await, 0);
    assert!(supervisor.statuses().await.is_empty());

    // Camera appears in the store: a worker exists within one refresh
    // interval.
    let fixture = CameraFixture::start().await?;
    store.set_cameras(vec![camera("cam-1", "lot-1", &fixture.snapshot_url())]);
    wait_for("worker to spawn", WAIT, || async {
        supervisor.worker_count().await == 1
    })
    .await?;
    let statuses = supervisor.statuses().await;
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].camera_id, "cam-1");
    assert!(statuses[0].worker_enabled);

    // The worker is actually ticking against the fixture.
    wait_for("worker to fetch frames", WAIT, || async { fixture.fetch_count() >= 2 }).await?;

    // Camera disabled: the worker is reaped within the next interval.
    store.set_worker_enabled("cam-1", false);
    wait_for("worker to stop", WAIT, || async { supervisor.worker_count().await == 0 }).await?;
    assert!(supervisor.statuses().await.is_empty());

    Ok(())
}

// -- Full pipeline over a live camera fixture ---------------------------------

#[tokio::test]
async fn worker_publishes_annotated_frames_with_occupancy_and_plate() -> anyhow::Result<()> {
    ensure_crypto();
    let fixture = CameraFixture::start().await?;
    let store = Arc::new(MemoryStore::new());
    let shutdown = CancellationToken::new();
    let hub = local_hub(&shutdown);

    // One space and a detection parked squarely on it (fixture frames are
    // 320x240).
    store.set_spaces(vec![space("s1", "cam-1", NormBox::new(0.1, 0.2, 0.2, 0.3))]);
    let parked = Detection {
        class: "car".to_owned(),
        confidence: 0.9,
        bbox: PixelBox::new(33, 50, 62, 70),
        track_id: Some(1),
    };

    // A scripted detector long enough to outlast the assertion window; once
    // it runs dry the detector reports an empty frame.
    let script: Vec<Vec<Detection>> = (0..1000).map(|_| vec![parked.clone()]).collect();
    let (supervisor, _cache, _token) = start_supervisor(
        fast_config(),
        Arc::clone(&store),
        Arc::new(ScriptedDetector::new(script)),
        FramePublisher::local(Arc::clone(&hub)),
    );

    // Stage a plate before the camera goes live so the first occupation
    // claims it.
    supervisor.plates().for_lot("lot-1").enqueue("XYZ789", 0.92, Instant::now());
    store.set_cameras(vec![camera("cam-1", "lot-1", &fixture.snapshot_url())]);

    wait_for("annotated frames with occupancy", WAIT, || async {
        match hub.get("cam-1").await.and_then(|b| b.latest()) {
            Some(update) => {
                update.frame_count >= 2
                    && update.metadata.occupied_spaces == 1
                    && update.metadata.total_spaces == 1
            }
            None => false,
        }
    })
    .await?;

    let update = hub.get("cam-1").await.and_then(|b| b.latest()).expect("latest frame");
    // Annotated output is a JPEG.
    assert_eq!(&update.frame[..2], &[0xFF, 0xD8]);
    // Metadata reflects the matched space and the claimed plate.
    assert_eq!(update.metadata.vehicle_count, 1);
    assert_eq!(update.metadata.matches.len(), 1);
    assert_eq!(update.metadata.matches[0].space, "s1");
    assert_eq!(update.metadata.spaces[0].plate.as_deref(), Some("XYZ789"));
    assert!(update.metadata.tracking_enabled);
    assert_eq!(update.metadata.detections.len(), 1);
    assert_eq!(update.metadata.detections[0].track_id, Some(1));
    assert_eq!(update.metadata.detections[0].plate.as_deref(), Some("XYZ789"));

    // The occupancy write reached the store, carrying the plate.
    wait_for("occupancy persisted", WAIT, || async {
        store.updates().iter().any(|(id, u)| id == "s1" && u.occupied)
    })
    .await?;

    Ok(())
}

// -- Back-off on a dead camera ------------------------------------------------

#[tokio::test]
async fn worker_backs_off_after_consecutive_fetch_failures() -> anyhow::Result<()> {
    ensure_crypto();
    let fixture = CameraFixture::start_broken().await?;
    let store = Arc::new(MemoryStore::new());
    store.set_cameras(vec![camera("cam-1", "lot-1", &fixture.snapshot_url())]);
    let shutdown = CancellationToken::new();
    let hub = local_hub(&shutdown);

    let config = WatchConfig {
        max_consecutive_fetch_failures: 3,
        fetch_backoff_secs: 1,
        ..fast_config()
    };
    let (supervisor, _cache, _token) = start_supervisor(
        config,
        Arc::clone(&store),
        Arc::new(NullDetector),
        FramePublisher::local(hub),
    );

    // Failures accumulate at the normal 20 fps cadence until the threshold.
    wait_for("failure threshold", WAIT, || async {
        supervisor.statuses().await.first().map(|s| s.consecutive_failures >= 3).unwrap_or(false)
    })
    .await?;

    // Backed off: attempts are now spaced at the back-off interval, far below
    // the normal cadence (which would be ~12 fetches in 600 ms).
    let before = fixture.fetch_count();
    tokio::time::sleep(Duration::from_millis(600)).await;
    let during_backoff = fixture.fetch_count() - before;
    assert!(during_backoff <= 2, "expected backed-off fetch rate, saw {during_backoff}");

    // The worker never succeeded, and it is still alive.
    let statuses = supervisor.statuses().await;
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].last_success_ms, 0);
    assert!(statuses[0].fps < 0.1);

    Ok(())
}

// -- S2: single car parks, then leaves (debounce timeline) --------------------

#[tokio::test]
async fn single_car_debounce_timeline() {
    let frame_w = 1000;
    let frame_h = 1000;
    let spaces = vec![space("s1", "cam-1", NormBox::new(0.1, 0.2, 0.2, 0.3))];
    let parked = Detection {
        class: "car".to_owned(),
        confidence: 0.9,
        bbox: PixelBox::new(120, 220, 180, 280),
        track_id: Some(4),
    };
    let classes: HashSet<String> =
        ["car", "truck", "bus", "motorcycle"].iter().map(|s| (*s).to_owned()).collect();
    let params = MatchParams::default();

    let plates = Arc::new(parkwatch::plates::PlateQueue::new(10));
    let mut tracker = OccupancyTracker::new("cam-1", 10, plates);

    let mut occupied_by_frame = Vec::new();
    for frame in 1..=50u64 {
        // Frames 1-30: the car is detected; from 31 on, nothing is.
        let detections: Vec<Detection> =
            if frame <= 30 { vec![parked.clone()] } else { Vec::new() };
        let outcome = match_spaces(&detections, &spaces, frame_w, frame_h, &params, &classes);
        tracker.observe(&outcome, &detections, frame);
        occupied_by_frame.push(tracker.state("s1").map(|s| s.occupied).unwrap_or(false));
    }

    // Occupied from the very first frame through the debounce window.
    for frame in 1..=40 {
        assert!(occupied_by_frame[frame - 1], "expected OCCUPIED at frame {frame}");
    }
    // Free exactly at frame 41 (10 consecutive misses after frame 30).
    for frame in 41..=50 {
        assert!(!occupied_by_frame[frame - 1], "expected FREE at frame {frame}");
    }
}

// -- S3: plate carryover between barrier and regular cameras ------------------

#[tokio::test]
async fn plate_carryover_assigns_newest_first() {
    let directory = PlateDirectory::new(10);
    let lot_queue = directory.for_lot("lot-L");

    // Barrier camera B records two entries; XYZ789 is the newest.
    lot_queue.enqueue("ABC123", 0.91, Instant::now());
    lot_queue.enqueue("XYZ789", 0.88, Instant::now());

    // Regular camera R consumes them on successive new occupations.
    let mut tracker = OccupancyTracker::new("cam-R", 10, directory.for_lot("lot-L"));
    let spaces = vec![
        space("R-S1", "cam-R", NormBox::new(0.05, 0.1, 0.25, 0.3)),
        space("R-S2", "cam-R", NormBox::new(0.4, 0.1, 0.25, 0.3)),
        space("R-S3", "cam-R", NormBox::new(0.7, 0.1, 0.25, 0.3)),
    ];
    let classes: HashSet<String> = std::iter::once("car".to_owned()).collect();
    let params = MatchParams::default();

    let arrive = |x: i32| Detection {
        class: "car".to_owned(),
        confidence: 0.9,
        bbox: PixelBox::new(x, 100, 250, 300),
        track_id: None,
    };

    // t1: a car parks in R-S1.
    let dets = vec![arrive(50)];
    let outcome = match_spaces(&dets, &spaces, 1000, 1000, &params, &classes);
    tracker.observe(&outcome, &dets, 1);
    assert_eq!(tracker.state("R-S1").unwrap().plate.as_deref(), Some("XYZ789"));

    // t2: another parks in R-S2.
    let dets = vec![arrive(50), arrive(400)];
    let outcome = match_spaces(&dets, &spaces, 1000, 1000, &params, &classes);
    tracker.observe(&outcome, &dets, 2);
    assert_eq!(tracker.state("R-S2").unwrap().plate.as_deref(), Some("ABC123"));

    // t3: a third arrival finds the queue exhausted.
    let dets = vec![arrive(50), arrive(400), arrive(700)];
    let outcome = match_spaces(&dets, &spaces, 1000, 1000, &params, &classes);
    tracker.observe(&outcome, &dets, 3);
    assert_eq!(tracker.state("R-S3").unwrap().plate, None);
}
