//! HTTP admin server for the CRM replica.

mod api;
mod config;
mod error;
mod main_lib;
mod scheduler;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;
use crate::main_lib::{app_router, build_state};
use crate::scheduler::spawn_sync_scheduler;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // `init` also bridges `log` records from the library crates.
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = ServerConfig::from_env()?;
    let state = build_state(&config).await?;

    match config.sync_interval {
        Some(period) => {
            spawn_sync_scheduler(
                state.orchestrator.clone(),
                period,
                config.sync.max_age_hours,
            );
        }
        None => info!("Periodic sync disabled (CRM_SYNC_INTERVAL_SECS=0)"),
    }

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!("CRM replica server listening on {}", listener.local_addr()?);
    axum::serve(listener, app_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
    }
}
