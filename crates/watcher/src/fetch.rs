// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot frame fetcher for one camera.

use bytes::Bytes;
use reqwest::Client;

/// HTTP client for a camera's MJPEG snapshot URL.
pub struct FrameFetcher {
    url: String,
    client: Client,
}

impl FrameFetcher {
    /// `timeout` bounds the whole request, connect included.
    pub fn new(url: impl Into<String>, timeout: std::time::Duration) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { url: url.into(), client }
    }

    /// Fetch one JPEG snapshot.  Timeouts and non-2xx statuses are errors.
    pub async fn fetch(&self) -> anyhow::Result<Bytes> {
        let resp = self.client.get(&self.url).send().await?.error_for_status()?;
        Ok(resp.bytes().await?)
    }
}
