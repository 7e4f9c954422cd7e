// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashSet;
use std::time::Duration;

use crate::detect::matcher::{MatchMetric, MatchParams};
use crate::detect::DetectOptions;
use parkhub::config::HubConfig;

/// Configuration for the camera watcher.
#[derive(Debug, Clone, clap::Args)]
pub struct WatchConfig {
    /// Host to bind the health/status (and, in colocated mode, hub) server on.
    #[arg(long, default_value = "127.0.0.1", env = "PARKWATCH_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 9700, env = "PARKWATCH_PORT")]
    pub port: u16,

    /// Path to the JSON configuration document (cameras + spaces).  Without
    /// it the watcher runs against an empty in-memory store.
    #[arg(long, env = "PARKWATCH_STORE_PATH")]
    pub store_path: Option<std::path::PathBuf>,

    /// Base URL of the detection/tracking inference service.
    #[arg(long, env = "PARKWATCH_DETECTOR_URL")]
    pub detector_url: Option<String>,

    /// Base URL of the license-plate OCR service (barrier cameras only).
    #[arg(long, env = "PARKWATCH_PLATE_OCR_URL")]
    pub plate_ocr_url: Option<String>,

    /// Base URL of a remote broadcast hub.  Unset means the hub runs
    /// in-process and viewers connect to this binary directly.
    #[arg(long, env = "PARKWATCH_HUB_URL")]
    pub hub_url: Option<String>,

    /// TTF/OTF font for overlay labels.  Without it labels are skipped.
    #[arg(long, env = "PARKWATCH_FONT_PATH")]
    pub font_path: Option<std::path::PathBuf>,

    /// Per-camera processing cap in frames per second (cameras may override).
    #[arg(long, default_value_t = 10.0, env = "PARKWATCH_TARGET_FPS")]
    pub target_fps: f64,

    /// Single-frame HTTP fetch timeout in milliseconds.
    #[arg(long, default_value_t = 3000, env = "PARKWATCH_FETCH_TIMEOUT_MS")]
    pub fetch_timeout_ms: u64,

    /// Consecutive fetch/decode/detect failures before a worker backs off.
    #[arg(long, default_value_t = 30, env = "PARKWATCH_MAX_CONSECUTIVE_FETCH_FAILURES")]
    pub max_consecutive_fetch_failures: u32,

    /// Fetch spacing in seconds while backed off.
    #[arg(long, default_value_t = 5, env = "PARKWATCH_FETCH_BACKOFF_SECS")]
    pub fetch_backoff_secs: u64,

    /// Detector confidence floor.
    #[arg(long, default_value_t = 0.25, env = "PARKWATCH_CONF_THRESHOLD")]
    pub conf_threshold: f32,

    /// Detector NMS IoU threshold.
    #[arg(long, default_value_t = 0.45, env = "PARKWATCH_IOU_THRESHOLD")]
    pub iou_threshold: f32,

    /// Request stable track ids from the detector.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set, env = "PARKWATCH_TRACKING_ENABLED")]
    pub tracking_enabled: bool,

    /// Overlap metric for space matching.
    #[arg(long, value_enum, default_value = "iou", env = "PARKWATCH_MATCH_METRIC")]
    pub match_metric: MatchMetric,

    /// Minimum overlap for a detection to match a space.
    #[arg(long, default_value_t = 0.5, env = "PARKWATCH_MATCH_THRESHOLD")]
    pub match_threshold: f32,

    /// Frames of absence before an occupied space is vacated.
    #[arg(long, default_value_t = 10, env = "PARKWATCH_FREE_DEBOUNCE_FRAMES")]
    pub free_debounce_frames: u32,

    /// Track-center points kept per trail.
    #[arg(long, default_value_t = 30, env = "PARKWATCH_TRAIL_LENGTH")]
    pub trail_length: usize,

    /// JPEG quality for annotated frames.
    #[arg(long, default_value_t = 85, env = "PARKWATCH_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// Producer-to-broadcaster handoff timeout in milliseconds.
    #[arg(long, default_value_t = 100, env = "PARKWATCH_PUBLISH_TIMEOUT_MS")]
    pub publish_timeout_ms: u64,

    /// Configuration cache TTL / supervisor reconcile interval in
    /// milliseconds.
    #[arg(long, default_value_t = 30_000, env = "PARKWATCH_CAMERAS_REFRESH_INTERVAL_MS")]
    pub cameras_refresh_interval_ms: u64,

    /// Per-lot plate FIFO capacity.
    #[arg(long, default_value_t = 10, env = "PARKWATCH_PLATE_QUEUE_CAPACITY")]
    pub plate_queue_capacity: usize,

    /// Plate purge horizon in seconds.
    #[arg(long, default_value_t = 300, env = "PARKWATCH_PLATE_QUEUE_MAX_AGE_SECS")]
    pub plate_queue_max_age_secs: u64,

    /// Minimum spacing between plate-OCR calls on one barrier camera, in
    /// milliseconds.
    #[arg(long, default_value_t = 1000, env = "PARKWATCH_PLATE_OCR_MIN_INTERVAL_MS")]
    pub plate_ocr_min_interval_ms: u64,

    /// Per-space occupancy persistence rate cap in seconds.
    #[arg(long, default_value_t = 5, env = "PARKWATCH_OCCUPANCY_PERSIST_MIN_INTERVAL_SECS")]
    pub occupancy_persist_min_interval_secs: u64,

    /// Comma-separated detection classes accepted as vehicles.
    #[arg(long, default_value = "car,truck,bus,motorcycle", env = "PARKWATCH_VEHICLE_CLASSES")]
    pub vehicle_classes: String,

    /// Grace period when stopping a worker, in seconds.
    #[arg(long, default_value_t = 5, env = "PARKWATCH_WORKER_SHUTDOWN_TIMEOUT_SECS")]
    pub worker_shutdown_timeout_secs: u64,

    /// Cooldown before restarting a crashed worker, in milliseconds.
    #[arg(long, default_value_t = 1000, env = "PARKWATCH_WORKER_RESTART_COOLDOWN_MS")]
    pub worker_restart_cooldown_ms: u64,

    /// Per-viewer send timeout for the embedded hub, in milliseconds.
    #[arg(long, default_value_t = 500, env = "PARKWATCH_SEND_TIMEOUT_MS")]
    pub per_viewer_send_timeout_ms: u64,

    /// Embedded-hub keepalive idle in seconds.
    #[arg(long, default_value_t = 30, env = "PARKWATCH_KEEPALIVE_IDLE_SECS")]
    pub keepalive_idle_secs: u64,

    /// Embedded-hub idle broadcaster TTL in seconds.
    #[arg(long, default_value_t = 300, env = "PARKWATCH_BROADCASTER_IDLE_TTL_SECS")]
    pub broadcaster_idle_ttl_secs: u64,
}

impl WatchConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn fetch_backoff(&self) -> Duration {
        Duration::from_secs(self.fetch_backoff_secs)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn cameras_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.cameras_refresh_interval_ms)
    }

    pub fn plate_queue_max_age(&self) -> Duration {
        Duration::from_secs(self.plate_queue_max_age_secs)
    }

    pub fn plate_ocr_min_interval(&self) -> Duration {
        Duration::from_millis(self.plate_ocr_min_interval_ms)
    }

    pub fn occupancy_persist_min_interval(&self) -> Duration {
        Duration::from_secs(self.occupancy_persist_min_interval_secs)
    }

    pub fn worker_shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_shutdown_timeout_secs)
    }

    pub fn worker_restart_cooldown(&self) -> Duration {
        Duration::from_millis(self.worker_restart_cooldown_ms)
    }

    /// Frame period for a camera, honoring its per-camera FPS override.
    pub fn frame_period(&self, fps_override: Option<f64>) -> Duration {
        let fps = fps_override.unwrap_or(self.target_fps).max(0.1);
        Duration::from_secs_f64(1.0 / fps)
    }

    pub fn detect_options(&self) -> DetectOptions {
        DetectOptions {
            conf_threshold: self.conf_threshold,
            iou_threshold: self.iou_threshold,
            tracking: self.tracking_enabled,
        }
    }

    pub fn match_params(&self) -> MatchParams {
        MatchParams { metric: self.match_metric, threshold: self.match_threshold }
    }

    pub fn vehicle_set(&self) -> HashSet<String> {
        self.vehicle_classes
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Hub settings used when the broadcaster runs in-process.
    pub fn embedded_hub_config(&self) -> HubConfig {
        HubConfig {
            host: self.host.clone(),
            port: self.port,
            per_viewer_send_timeout_ms: self.per_viewer_send_timeout_ms,
            keepalive_idle_secs: self.keepalive_idle_secs,
            broadcaster_idle_ttl_secs: self.broadcaster_idle_ttl_secs,
            ..HubConfig::default()
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 9700,
            store_path: None,
            detector_url: None,
            plate_ocr_url: None,
            hub_url: None,
            font_path: None,
            target_fps: 10.0,
            fetch_timeout_ms: 3000,
            max_consecutive_fetch_failures: 30,
            fetch_backoff_secs: 5,
            conf_threshold: 0.25,
            iou_threshold: 0.45,
            tracking_enabled: true,
            match_metric: MatchMetric::Iou,
            match_threshold: 0.5,
            free_debounce_frames: 10,
            trail_length: 30,
            jpeg_quality: 85,
            publish_timeout_ms: 100,
            cameras_refresh_interval_ms: 30_000,
            plate_queue_capacity: 10,
            plate_queue_max_age_secs: 300,
            plate_ocr_min_interval_ms: 1000,
            occupancy_persist_min_interval_secs: 5,
            vehicle_classes: "car,truck,bus,motorcycle".to_owned(),
            worker_shutdown_timeout_secs: 5,
            worker_restart_cooldown_ms: 1000,
            per_viewer_send_timeout_ms: 500,
            keepalive_idle_secs: 30,
            broadcaster_idle_ttl_secs: 300,
        }
    }
}
