// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the detection broadcast hub.
#[derive(Debug, Clone, clap::Args)]
pub struct HubConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "PARKHUB_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 9900, env = "PARKHUB_PORT")]
    pub port: u16,

    /// Per-viewer send timeout in milliseconds.  A viewer that cannot accept
    /// a frame within this window is disconnected.
    #[arg(long, default_value_t = 500, env = "PARKHUB_SEND_TIMEOUT_MS")]
    pub per_viewer_send_timeout_ms: u64,

    /// Idle seconds before the server sends a keepalive to a viewer.
    #[arg(long, default_value_t = 30, env = "PARKHUB_KEEPALIVE_IDLE_SECS")]
    pub keepalive_idle_secs: u64,

    /// Seconds of zero viewers and no publishes before a broadcaster is
    /// removed by the idle sweep.
    #[arg(long, default_value_t = 300, env = "PARKHUB_BROADCASTER_IDLE_TTL_SECS")]
    pub broadcaster_idle_ttl_secs: u64,

    /// Idle-sweep interval in seconds.
    #[arg(long, default_value_t = 60, env = "PARKHUB_SWEEP_INTERVAL_SECS")]
    pub sweep_interval_secs: u64,
}

impl HubConfig {
    pub fn per_viewer_send_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.per_viewer_send_timeout_ms)
    }

    pub fn keepalive_idle(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.keepalive_idle_secs)
    }

    pub fn broadcaster_idle_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.broadcaster_idle_ttl_secs)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 9900,
            per_viewer_send_timeout_ms: 500,
            keepalive_idle_secs: 30,
            broadcaster_idle_ttl_secs: 300,
            sweep_interval_secs: 60,
        }
    }
}
