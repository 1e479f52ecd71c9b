// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use donation_relay::config::Config;

#[tokio::main]
async fn main() {
    let config = Config::parse();

    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    init_tracing(&config);

    // reqwest and tokio-tungstenite share the process-wide rustls provider.
    let _ = rustls::crypto::ring::default_provider().install_default();

    if let Err(e) = donation_relay::run(config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match config.log_format.as_str() {
        "json" => {
            fmt::fmt().with_env_filter(filter).json().init();
        }
        _ => {
            fmt::fmt().with_env_filter(filter).init();
        }
    }
}
