// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Edge scenarios over real TCP: ingress POSTs, viewer WebSockets, fan-out
//! under a stalled viewer, keepalives, and the idle sweep.

use std::time::{Duration, Instant};

use base64::Engine as _;
use futures_util::{SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use parkhub::config::HubConfig;
use parkhub::wire::{BroadcastMetadata, NormBox, SpaceStatus};
use parkwatch_specs::{ensure_crypto, test_jpeg, wait_for, HubFixture};

const WAIT: Duration = Duration::from_secs(5);

fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn sample_metadata() -> BroadcastMetadata {
    BroadcastMetadata {
        vehicle_count: 1,
        occupied_spaces: 1,
        total_spaces: 2,
        spaces: vec![SpaceStatus {
            id: "s1".to_owned(),
            name: "A-01".to_owned(),
            occupied: true,
            bbox: NormBox::new(0.1, 0.2, 0.2, 0.3),
            plate: Some("XYZ789".to_owned()),
        }],
        detections: Vec::new(),
        matches: Vec::new(),
        tracking_enabled: true,
        timestamp_ms: 1234,
    }
}

async fn post_frame(
    base_url: &str,
    camera_id: &str,
    payload: &[u8],
    metadata: &BroadcastMetadata,
) -> anyhow::Result<serde_json::Value> {
    ensure_crypto();
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base_url}/api/broadcast-detection"))
        .json(&serde_json::json!({
            "camera_id": camera_id,
            "frame_base64": b64(payload),
            "metadata": metadata,
        }))
        .send()
        .await?
        .error_for_status()?;
    Ok(resp.json().await?)
}

/// Read WS messages until a JSON frame message arrives, skipping keepalives.
async fn next_frame_message(
    ws: &mut (impl Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin),
    timeout: Duration,
) -> anyhow::Result<serde_json::Value> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = deadline
            .checked_duration_since(tokio::time::Instant::now())
            .ok_or_else(|| anyhow::anyhow!("timed out waiting for frame message"))?;
        let msg = tokio::time::timeout(remaining, ws.next())
            .await
            .map_err(|_| anyhow::anyhow!("timed out waiting for frame message"))?;
        match msg {
            Some(Ok(Message::Text(text))) => {
                if let Ok(value) = serde_json::from_str::<serde_json::Value>(text.as_str()) {
                    if value["type"] == "frame" {
                        return Ok(value);
                    }
                }
                // keepalive/pong or other text: keep reading.
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => anyhow::bail!("ws error: {e}"),
            None => anyhow::bail!("ws closed"),
        }
    }
}

// -- Ingress → egress round trip ----------------------------------------------

#[tokio::test]
async fn ingress_frame_reaches_viewer_with_metadata() -> anyhow::Result<()> {
    let hub = HubFixture::start(HubConfig::default()).await?;
    let jpeg = test_jpeg(64, 48);
    let metadata = sample_metadata();

    // Publish before any viewer exists.
    let resp = post_frame(&hub.base_url, "cam-1", &jpeg, &metadata).await?;
    assert_eq!(resp["success"], true);
    assert_eq!(resp["viewers"], 0);
    assert_eq!(resp["frame_size"], jpeg.len());

    // A late subscriber is primed with the latest frame.
    let (mut ws, _) = tokio_tungstenite::connect_async(hub.viewer_url("cam-1")).await?;
    let frame = next_frame_message(&mut ws, WAIT).await?;
    assert_eq!(frame["camera_id"], "cam-1");
    assert_eq!(frame["frame_count"], 1);
    let data_url = frame["frame"].as_str().unwrap_or_default();
    assert!(data_url.starts_with("data:image/jpeg;base64,"));
    let decoded: BroadcastMetadata = serde_json::from_value(frame["metadata"].clone())?;
    assert_eq!(decoded, metadata);

    // The next publish streams through with an increased counter.
    post_frame(&hub.base_url, "cam-1", &jpeg, &metadata).await?;
    let frame = next_frame_message(&mut ws, WAIT).await?;
    assert_eq!(frame["frame_count"], 2);

    ws.close(None).await?;
    Ok(())
}

#[tokio::test]
async fn viewers_only_see_their_camera() -> anyhow::Result<()> {
    let hub = HubFixture::start(HubConfig::default()).await?;
    let jpeg = test_jpeg(64, 48);

    let (mut ws, _) = tokio_tungstenite::connect_async(hub.viewer_url("cam-2")).await?;
    post_frame(&hub.base_url, "cam-1", &jpeg, &BroadcastMetadata::default()).await?;

    // Nothing for cam-2: the read times out.
    let got = next_frame_message(&mut ws, Duration::from_millis(500)).await;
    assert!(got.is_err());

    post_frame(&hub.base_url, "cam-2", &jpeg, &BroadcastMetadata::default()).await?;
    let frame = next_frame_message(&mut ws, WAIT).await?;
    assert_eq!(frame["camera_id"], "cam-2");
    Ok(())
}

// -- S4: fan-out with a stalled viewer ----------------------------------------

#[tokio::test]
async fn publish_stays_fast_and_reaches_live_viewers() -> anyhow::Result<()> {
    let hub = HubFixture::start(HubConfig::default()).await?;
    let jpeg = test_jpeg(64, 48);

    let (mut v1, _) = tokio_tungstenite::connect_async(hub.viewer_url("cam-1")).await?;
    // v2 connects but never reads.
    let (_v2, _) = tokio_tungstenite::connect_async(hub.viewer_url("cam-1")).await?;
    let (mut v3, _) = tokio_tungstenite::connect_async(hub.viewer_url("cam-1")).await?;

    wait_for("viewers registered", WAIT, || async {
        hub.state.viewer_count().await == 3
    })
    .await?;

    let started = Instant::now();
    let resp = post_frame(&hub.base_url, "cam-1", &jpeg, &BroadcastMetadata::default()).await?;
    // The ingress POST (which wraps Publish) returns promptly regardless of
    // viewer behavior.
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(resp["viewers"], 3);

    // The live viewers both receive the frame.
    let f1 = next_frame_message(&mut v1, WAIT).await?;
    let f3 = next_frame_message(&mut v3, WAIT).await?;
    assert_eq!(f1["frame_count"], 1);
    assert_eq!(f3["frame_count"], 1);
    Ok(())
}

// -- Keepalive / ping-pong ----------------------------------------------------

#[tokio::test]
async fn idle_viewer_gets_keepalives_and_pong() -> anyhow::Result<()> {
    let config = HubConfig { keepalive_idle_secs: 1, ..HubConfig::default() };
    let hub = HubFixture::start(config).await?;

    let (mut ws, _) = tokio_tungstenite::connect_async(hub.viewer_url("cam-1")).await?;

    // No frames are flowing, so a keepalive arrives within ~1s.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    let mut saw_keepalive = false;
    while tokio::time::Instant::now() < deadline {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next()).await;
        if let Ok(Some(Ok(Message::Text(text)))) = msg {
            if text.as_str() == "keepalive" {
                saw_keepalive = true;
                break;
            }
        }
    }
    assert!(saw_keepalive, "expected a keepalive within the idle window");

    // Client pings are answered with pongs.
    ws.send(Message::Text("ping".into())).await?;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        anyhow::ensure!(tokio::time::Instant::now() < deadline, "no pong received");
        if let Ok(Some(Ok(Message::Text(text)))) =
            tokio::time::timeout(Duration::from_secs(2), ws.next()).await
        {
            if text.as_str() == "pong" {
                break;
            }
        }
    }
    Ok(())
}

// -- Idle sweep ---------------------------------------------------------------

#[tokio::test]
async fn idle_broadcaster_is_swept() -> anyhow::Result<()> {
    let config = HubConfig {
        broadcaster_idle_ttl_secs: 0,
        sweep_interval_secs: 1,
        ..HubConfig::default()
    };
    let hub = HubFixture::start(config).await?;

    post_frame(&hub.base_url, "cam-1", &test_jpeg(64, 48), &BroadcastMetadata::default())
        .await?;
    assert_eq!(hub.state.broadcaster_count().await, 1);

    // No viewers and a zero TTL: the periodic sweep removes it.
    wait_for("idle broadcaster sweep", WAIT, || async {
        hub.state.broadcaster_count().await == 0
    })
    .await?;
    Ok(())
}
