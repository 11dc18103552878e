/**
 * METRICS COLLECTOR - Point d'entrée du service central
 *
 * RÔLE : Bootstrap : config, store time-series, API REST, arrêt propre.
 *
 * ARCHITECTURE : publishers → POST /api/v1/metrics → MetricsRepository → PartitionedStore.
 * Les requêtes (latest / range) passent par le même repository.
 */

mod config;
mod diagnostics;
mod health;
mod http;
mod models;
mod state;
mod store;

use crate::config::load_config;
use crate::health::HealthTracker;
use crate::state::AppState;
use crate::store::{MetricStore, MetricsRepository, PartitionedStore};

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("metrics_collector=info")),
        )
        .init();

    let cfg = load_config().await?;

    let store: Arc<dyn MetricStore> = if cfg.store.persist {
        Arc::new(
            PartitionedStore::open(&cfg.store.data_dir, &cfg.store.keyspace)
                .context("failed to open metrics store")?,
        )
    } else {
        info!("store persistence disabled, records are kept in memory only");
        Arc::new(PartitionedStore::in_memory())
    };

    let repo = MetricsRepository::new(store, cfg.store.pool_size, cfg.store.timeout());
    let app_state = AppState {
        repo,
        health: HealthTracker::new(),
    };

    let app = http::build_router(app_state);

    let listener = TcpListener::bind(cfg.listen)
        .await
        .with_context(|| format!("failed to bind {}", cfg.listen))?;
    info!(addr = %cfg.listen, pool_size = cfg.store.pool_size, "collector listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("collector stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
