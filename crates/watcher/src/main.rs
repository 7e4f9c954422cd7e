// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use parkwatch::config::WatchConfig;

#[derive(Debug, Parser)]
#[command(name = "parkwatch", about = "Real-time parking monitoring pipeline")]
struct Cli {
    #[command(flatten)]
    config: WatchConfig,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // reqwest is built against rustls with no default crypto provider.
    let _ = rustls::crypto::ring::default_provider().install_default();

    if let Err(e) = parkwatch::run(cli.config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
