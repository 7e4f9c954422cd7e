// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Viewer WebSocket endpoint — streams annotated frames for one camera.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use base64::Engine as _;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::time::Instant;

use crate::broadcaster::{Broadcaster, FrameUpdate};
use crate::state::HubState;
use crate::wire::ViewerMessage;

/// Query parameters for the viewer WebSocket.
#[derive(Debug, Deserialize)]
pub struct ViewerQuery {
    pub camera_id: String,
}

/// `GET /ws/viewer/detection?camera_id=<id>` — WebSocket upgrade for a
/// camera's frame stream.
pub async fn viewer_handler(
    State(state): State<Arc<HubState>>,
    Query(query): Query<ViewerQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if query.camera_id.is_empty() {
        return axum::http::Response::builder()
            .status(400)
            .body(axum::body::Body::from("missing camera_id"))
            .unwrap_or_default()
            .into_response();
    }

    // Subscribing creates the broadcaster if the producer hasn't yet.
    let broadcaster = state.get_or_create(&query.camera_id).await;
    ws.on_upgrade(move |socket| handle_viewer(state, broadcaster, socket)).into_response()
}

/// Per-connection event loop for one viewer.
async fn handle_viewer(state: Arc<HubState>, broadcaster: Arc<Broadcaster>, socket: WebSocket) {
    let send_timeout = state.config.per_viewer_send_timeout();
    let keepalive_idle = state.config.keepalive_idle();
    let camera_id = broadcaster.camera_id().to_owned();

    let (primed, mut rx) = broadcaster.subscribe();
    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut last_sent = Instant::now();

    // Prime the stream with the current frame, if any.
    if let Some(update) = primed {
        if send_frame(&mut ws_tx, &camera_id, &update, send_timeout).await.is_err() {
            return;
        }
        last_sent = Instant::now();
    }

    loop {
        let keepalive_at = last_sent + keepalive_idle;
        tokio::select! {
            _ = state.shutdown.cancelled() => break,

            // Producer -> viewer
            update = rx.recv() => {
                let update = match update {
                    Ok(u) => u,
                    // Fell behind: skip to the newest frame on the channel.
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };
                if send_frame(&mut ws_tx, &camera_id, &update, send_timeout).await.is_err() {
                    tracing::info!(camera_id = %camera_id, "viewer dropped: send failed or timed out");
                    break;
                }
                last_sent = Instant::now();
            }

            // Viewer -> server: only "ping" is meaningful.
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if text.as_str() == "ping"
                            && send_text(&mut ws_tx, "pong", send_timeout).await.is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }

            // No outgoing frames for a while: keepalive.
            _ = tokio::time::sleep_until(keepalive_at) => {
                if send_text(&mut ws_tx, "keepalive", send_timeout).await.is_err() {
                    tracing::info!(camera_id = %camera_id, "viewer dropped: keepalive failed");
                    break;
                }
                last_sent = Instant::now();
            }
        }
    }
}

/// Send one frame message, bounded by the per-viewer send timeout.
async fn send_frame(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    camera_id: &str,
    update: &FrameUpdate,
    send_timeout: Duration,
) -> Result<(), ()> {
    let b64 = base64::engine::general_purpose::STANDARD.encode(&update.frame);
    let msg = ViewerMessage::Frame {
        camera_id: camera_id.to_owned(),
        frame: format!("data:image/jpeg;base64,{b64}"),
        metadata: update.metadata.clone(),
        frame_count: update.frame_count,
        timestamp: update.timestamp_ms,
    };
    let json = serde_json::to_string(&msg).map_err(|_| ())?;
    send_text(ws_tx, &json, send_timeout).await
}

/// Send a text message, bounded by the per-viewer send timeout.
async fn send_text(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    text: &str,
    send_timeout: Duration,
) -> Result<(), ()> {
    match tokio::time::timeout(send_timeout, ws_tx.send(Message::Text(text.to_owned().into())))
        .await
    {
        Ok(Ok(())) => Ok(()),
        _ => Err(()),
    }
}
