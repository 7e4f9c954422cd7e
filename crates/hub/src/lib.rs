// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parkhub: in-memory detection broadcast hub.
//!
//! Receives annotated frames + metadata from camera watchers (HTTP ingress or
//! in-process publish) and fans them out to browser viewers over WebSocket.

pub mod broadcaster;
pub mod config;
pub mod error;
pub mod state;
pub mod sweep;
pub mod transport;
pub mod wire;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::HubConfig;
use crate::state::HubState;
use crate::sweep::spawn_idle_sweep;
use crate::transport::build_router;

/// Run the hub server until shutdown.
pub async fn run(config: HubConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let state = Arc::new(HubState::new(config, shutdown.clone()));
    spawn_idle_sweep(Arc::clone(&state));

    tracing::info!("parkhub listening on {addr}");
    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}
