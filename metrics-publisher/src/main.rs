//! Metrics Publisher - host agent feeding the metrics collector
//!
//! This agent runs on every monitored host:
//! - Resolves the host identity (hostname + first non-loopback IPv4) once
//! - Samples CPU, memory and root disk utilization on a fixed interval
//! - Publishes each sample to the collector over HTTP

mod config;
mod delivery;
mod identity;
mod publisher;
mod sampler;
mod transport;

use anyhow::{Context, Result};
use config::PublisherConfig;
use identity::HostIdentity;
use publisher::Publisher;
use sampler::SysinfoSampler;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use transport::HttpTransport;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("metrics_publisher=info")))
        .init();

    info!("Starting Metrics Publisher v{}", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = PublisherConfig::load(config_path).await.context("Failed to load configuration")?;

    let identity = HostIdentity::resolve().context("Cannot determine host identity")?;
    let sampler = SysinfoSampler::new(config.cpu_window(), config.disk_mount.clone());
    let transport = HttpTransport::new(config.target_url.clone(), config.request_timeout())
        .context("Failed to build HTTP client")?;
    info!(target = %config.target_url, "Publishing to collector");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for shutdown signal");
                // sender stays alive with this task, the loop keeps running
                std::future::pending::<()>().await;
            }
        }
    });

    Publisher::new(identity, sampler, transport, config.interval())
        .with_delivery(config.delivery_mode())
        .run(shutdown_rx)
        .await;

    Ok(())
}
