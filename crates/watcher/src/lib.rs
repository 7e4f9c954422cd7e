// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parkwatch: real-time parking monitoring pipeline.
//!
//! One worker per camera fetches snapshots, runs vehicle detection with
//! tracking, matches detections to parking spaces, maintains occupancy and
//! plate identity, annotates frames, and publishes them to the broadcast hub
//! (embedded in-process by default, or a remote `parkhub`).

pub mod annotate;
pub mod config;
pub mod detect;
pub mod fetch;
pub mod geometry;
pub mod occupancy;
pub mod plates;
pub mod publish;
pub mod store;
pub mod supervisor;
pub mod transport;
pub mod worker;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::WatchConfig;
use crate::detect::http::HttpDetector;
use crate::detect::{Detector, NullDetector};
use crate::plates::{HttpPlateRecognizer, PlateRecognizer};
use crate::publish::FramePublisher;
use crate::store::cache::ConfigCache;
use crate::store::file::FileStore;
use crate::store::memory::MemoryStore;
use crate::store::ConfigStore;
use crate::supervisor::Supervisor;
use crate::transport::WatchState;

/// Run the watcher until shutdown.
pub async fn run(config: WatchConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let config = Arc::new(config);
    let shutdown = CancellationToken::new();

    // Ctrl-C triggers a graceful stop of workers and the edge.
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                shutdown.cancel();
            }
        });
    }

    let store: Arc<dyn ConfigStore> = match &config.store_path {
        Some(path) => Arc::new(FileStore::new(path.clone())),
        None => {
            tracing::warn!("no --store-path configured, starting with an empty in-memory store");
            Arc::new(MemoryStore::new())
        }
    };
    let cache = Arc::new(ConfigCache::new(Arc::clone(&store), config.cameras_refresh_interval()));

    let detector: Arc<dyn Detector> = match &config.detector_url {
        Some(url) => Arc::new(HttpDetector::new(url.clone(), "parkwatch")),
        None => {
            tracing::warn!("no --detector-url configured, running with a null detector");
            Arc::new(NullDetector)
        }
    };

    let recognizer: Option<Arc<dyn PlateRecognizer>> = config
        .plate_ocr_url
        .as_ref()
        .map(|url| Arc::new(HttpPlateRecognizer::new(url.clone())) as Arc<dyn PlateRecognizer>);

    let font = match &config.font_path {
        Some(path) => match annotate::Annotator::load_font(path) {
            Ok(font) => Some(font),
            Err(e) => {
                tracing::warn!(path = %path.display(), err = %e, "font load failed, labels disabled");
                None
            }
        },
        None => None,
    };

    // Embedded hub unless a remote one is configured.
    let (publisher, hub_state) = match &config.hub_url {
        Some(url) => {
            tracing::info!(hub_url = %url, "publishing to remote hub");
            (FramePublisher::remote(url.clone()), None)
        }
        None => {
            let hub_state = Arc::new(parkhub::state::HubState::new(
                config.embedded_hub_config(),
                shutdown.clone(),
            ));
            parkhub::sweep::spawn_idle_sweep(Arc::clone(&hub_state));
            (FramePublisher::local(Arc::clone(&hub_state)), Some(hub_state))
        }
    };

    let supervisor = Arc::new(Supervisor::new(
        Arc::clone(&config),
        cache,
        store,
        detector,
        recognizer,
        publisher,
        font,
        shutdown.clone(),
    ));
    supervisor.spawn_reconcile_loop();

    let mut router =
        transport::build_router(Arc::new(WatchState { supervisor: Arc::clone(&supervisor) }));
    if let Some(hub_state) = hub_state {
        router = router.merge(parkhub::transport::build_edge_router(hub_state));
    }

    tracing::info!("parkwatch listening on {addr}");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    supervisor.stop_all().await;
    Ok(())
}
