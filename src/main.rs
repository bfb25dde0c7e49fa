//! CDN tunnel server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client (via CDN)
//!          │  HTTP(S) request: destination, session id, optional body
//!          ▼
//!     ┌─────────┐    ┌─────────┐    ┌──────────────┐    ┌────────────┐
//!     │   net   │───▶│  http   │───▶│    tunnel    │───▶│  upstream  │───▶ Destination
//!     │listener │    │ server  │    │ SessionStore │    │ TCP / app  │
//!     └─────────┘    └─────────┘    └──────┬───────┘    └────────────┘
//!                                          │
//!                                    ┌─────▼─────┐
//!                                    │  Reaper   │  evicts idle sessions
//!                                    └───────────┘
//! ```

use clap::Parser;

use cdn_tunnel::cli::Cli;
use cdn_tunnel::config::{loader, TunnelConfig};
use cdn_tunnel::http::HttpServer;
use cdn_tunnel::lifecycle::{signals, Shutdown};
use cdn_tunnel::net::{listener, tls};
use cdn_tunnel::observability::{logging, metrics};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let file_config = match &cli.config {
        Some(path) => loader::load_config(path)?,
        None => TunnelConfig::default(),
    };
    let config = loader::finalize(cli.apply(file_config))?;

    logging::init_logging(&config.observability.log_level);
    tracing::info!("cdn-tunnel v{} starting", env!("CARGO_PKG_VERSION"));

    let origin: listener::Origin = config.listener.origin.parse()?;
    tracing::info!(
        origin = %origin,
        allow_direct = config.access.allow_direct,
        idle_timeout_secs = config.sessions.idle_timeout_secs,
        app_command = ?config.upstream.app_command,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let tls_config = match (&config.listener.tls, origin.is_https()) {
        (Some(tls), true) => Some(tls::load_tls_config(tls, config.access.allow_direct)?),
        _ => None,
    };

    let bound = listener::bind(&origin).await?;

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    tokio::spawn(async move {
        signals::wait_for_signal().await;
        shutdown.trigger();
    });

    let server = HttpServer::new(config);
    match tls_config {
        Some(tls) => server.run_tls(bound, tls, receiver).await?,
        None => server.run(bound, receiver).await?,
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
