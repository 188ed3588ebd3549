//! QuoteSignal - multi-exchange quote aggregation and signal service
//!
//! Loads configuration, starts the cycle scheduler and, with the `dashboard`
//! feature, serves the read-only HTTP API. Ctrl-C stops both.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use quotesignal::{AppConfig, CycleScheduler, SnapshotStore};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("loading configuration")?;
    init_tracing(config.logging.json);

    info!("🚀 Starting QuoteSignal");
    info!(config = %config, "Configuration loaded");

    let store = Arc::new(SnapshotStore::new());
    let scheduler = CycleScheduler::from_config(&config, Arc::clone(&store))
        .context("invalid configuration")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx.clone()));

    #[cfg(feature = "dashboard")]
    let dashboard_handle = if config.dashboard.enabled {
        Some(spawn_dashboard(&config.dashboard.bind, Arc::clone(&store), shutdown_rx).await?)
    } else {
        None
    };
    #[cfg(not(feature = "dashboard"))]
    drop(shutdown_rx);

    tokio::signal::ctrl_c()
        .await
        .context("listening for ctrl-c")?;
    info!("👋 Shutting down gracefully...");
    let _ = shutdown_tx.send(true);

    scheduler_handle.await.context("scheduler task panicked")?;
    #[cfg(feature = "dashboard")]
    if let Some(handle) = dashboard_handle {
        handle.await.context("dashboard task panicked")??;
    }

    let health = store.health();
    info!(
        generation = health.generation,
        pairs = health.pairs,
        "Stopped"
    );
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(feature = "dashboard")]
async fn spawn_dashboard(
    bind: &str,
    store: Arc<SnapshotStore>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<tokio::task::JoinHandle<Result<()>>> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding dashboard to {bind}"))?;
    info!(addr = %listener.local_addr()?, "📊 Dashboard listening");

    let router = quotesignal::dashboard::create_router(store);
    Ok(tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                while shutdown.changed().await.is_ok() {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            })
            .await
            .context("dashboard server failed")
    }))
}
