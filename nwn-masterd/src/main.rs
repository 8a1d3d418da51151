mod api;
mod config;
mod query;
mod registry;
mod sweeper;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use crate::config::Config;
use crate::registry::Registry;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("nwn_masterd=info"))
        )
        .init();

    tracing::info!("Starting nwn-masterd");

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/nwn-master/masterd.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!(
        "Loaded config from {} (heartbeat timeout {}s, name match {:?})",
        config_path,
        config.registry.heartbeat_timeout_secs,
        config.registry.name_match
    );

    let sweep_interval = config.registry.sweep_interval();
    let registry = Arc::new(Registry::new(config.registry.clone()));

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Spawn expiry sweeper
    let sweeper_cancel = cancel.clone();
    let sweeper_registry = Arc::clone(&registry);
    let sweeper_handle = tokio::spawn(async move {
        // Take the daemon down with the sweeper, even on panic
        let _shutdown = sweeper_cancel.clone().drop_guard();
        if let Err(e) = sweeper::run(sweeper_registry, sweep_interval, sweeper_cancel).await {
            tracing::error!("Expiry sweeper error: {}", e);
        }
    });

    // Build API router
    let app_state = api::routes::AppState {
        registry: Arc::clone(&registry),
    };
    let app = api::routes::router(app_state);

    // Bind HTTP server
    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    // Run server with graceful shutdown
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for ctrl-c")?;
            tracing::info!("Shutdown signal received");
        }
        _ = cancel.cancelled() => {
            tracing::error!("Expiry sweeper stopped, shutting down");
        }
    }

    // Trigger cancellation
    cancel.cancel();

    // Wait for all tasks to complete
    let (sweeper_result, server_result) = tokio::join!(sweeper_handle, server_handle);
    if let Err(e) = sweeper_result {
        tracing::error!("Expiry sweeper task failed: {}", e);
    }
    if let Err(e) = server_result {
        tracing::error!("Server task failed: {}", e);
    }

    let stats = registry.stats();
    tracing::info!(
        "Shutdown complete ({} servers online across {} products)",
        stats.online,
        stats.products
    );
    Ok(())
}
