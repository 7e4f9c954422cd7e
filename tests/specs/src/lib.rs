// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end pipeline scenarios.
//!
//! Runs the watcher components in-process against seeded stores, scripted
//! detectors, and a real TCP hub, so scenarios are deterministic while still
//! exercising the HTTP/WS edge with real clients.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;

use parkhub::config::HubConfig;
use parkhub::state::HubState;
use parkwatch::detect::Detector;
use parkwatch::store::{CameraConfig, CameraKind, ParkingSpace};
use parkhub::wire::NormBox;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times — only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// A small valid JPEG frame for camera fixtures.
pub fn test_jpeg(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::from_pixel(width, height, image::Rgb([90, 90, 90]));
    parkwatch::annotate::encode_jpeg(&image, 85)
        .map(|b| b.to_vec())
        .unwrap_or_default()
}

// -- Fixtures -----------------------------------------------------------------

/// In-process HTTP camera serving a static JPEG snapshot.
pub struct CameraFixture {
    pub base_url: String,
    pub fetches: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl CameraFixture {
    pub async fn start() -> anyhow::Result<Self> {
        Self::serve(false).await
    }

    /// A camera whose snapshot endpoint always returns 500.
    pub async fn start_broken() -> anyhow::Result<Self> {
        Self::serve(true).await
    }

    async fn serve(broken: bool) -> anyhow::Result<Self> {
        let fetches = Arc::new(AtomicUsize::new(0));
        let jpeg = test_jpeg(320, 240);
        let shutdown = CancellationToken::new();

        let counter = Arc::clone(&fetches);
        let router = Router::new().route(
            "/snapshot",
            get(move || {
                let counter = Arc::clone(&counter);
                let jpeg = jpeg.clone();
                async move {
                    counter.fetch_add(1, Ordering::Relaxed);
                    if broken {
                        return Err(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
                    }
                    Ok(([(axum::http::header::CONTENT_TYPE, "image/jpeg")], jpeg))
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let token = shutdown.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await;
        });

        Ok(Self { base_url: format!("http://{addr}"), fetches, shutdown })
    }

    pub fn snapshot_url(&self) -> String {
        format!("{}/snapshot", self.base_url)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl Drop for CameraFixture {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// A hub served over real TCP.
pub struct HubFixture {
    pub state: Arc<HubState>,
    pub base_url: String,
    pub ws_base_url: String,
    shutdown: CancellationToken,
}

impl HubFixture {
    pub async fn start(config: HubConfig) -> anyhow::Result<Self> {
        let shutdown = CancellationToken::new();
        let state = Arc::new(HubState::new(config, shutdown.clone()));
        parkhub::sweep::spawn_idle_sweep(Arc::clone(&state));
        let router = parkhub::transport::build_router(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let token = shutdown.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await;
        });

        Ok(Self {
            state,
            base_url: format!("http://{addr}"),
            ws_base_url: format!("ws://{addr}"),
            shutdown,
        })
    }

    pub fn viewer_url(&self, camera_id: &str) -> String {
        format!("{}/ws/viewer/detection?camera_id={camera_id}", self.ws_base_url)
    }
}

impl Drop for HubFixture {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// -- Supervisor assembly ------------------------------------------------------

/// Wire up a supervisor over a seeded store with an injected detector and
/// publisher, and start its reconcile loop.
pub fn start_supervisor(
    config: parkwatch::config::WatchConfig,
    store: Arc<parkwatch::store::memory::MemoryStore>,
    detector: Arc<dyn Detector>,
    publisher: parkwatch::publish::FramePublisher,
) -> (Arc<parkwatch::supervisor::Supervisor>, Arc<parkwatch::store::cache::ConfigCache>, CancellationToken) {
    let config = Arc::new(config);
    let shutdown = CancellationToken::new();
    let dyn_store: Arc<dyn parkwatch::store::ConfigStore> = store.clone();
    let cache = Arc::new(parkwatch::store::cache::ConfigCache::new(
        Arc::clone(&dyn_store),
        config.cameras_refresh_interval(),
    ));
    let supervisor = Arc::new(parkwatch::supervisor::Supervisor::new(
        config,
        Arc::clone(&cache),
        dyn_store,
        detector,
        None,
        publisher,
        None,
        shutdown.clone(),
    ));
    supervisor.spawn_reconcile_loop();
    (supervisor, cache, shutdown)
}

// -- Seed data ----------------------------------------------------------------

pub fn camera(id: &str, lot: &str, snapshot_url: &str) -> CameraConfig {
    CameraConfig {
        id: id.to_owned(),
        name: format!("Camera {id}"),
        parking_lot_id: lot.to_owned(),
        snapshot_url: snapshot_url.to_owned(),
        worker_enabled: true,
        fps_override: None,
        kind: CameraKind::Regular,
        barrier_zones: Vec::new(),
    }
}

pub fn space(id: &str, camera_id: &str, bbox: NormBox) -> ParkingSpace {
    ParkingSpace {
        id: id.to_owned(),
        name: id.to_uppercase(),
        parking_lot_id: "lot-1".to_owned(),
        camera_id: camera_id.to_owned(),
        bbox,
        occupied: false,
        last_updated_ms: None,
        plate: None,
        track_id: None,
    }
}

/// Poll until `check` passes or the deadline expires.
pub async fn wait_for<F, Fut>(what: &str, timeout: Duration, mut check: F) -> anyhow::Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return Ok(());
        }
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}
