// API Server Binary Entry Point
//
// Purpose: Load the sailing dataset and serve the HTTP/JSON API
// Usage: cargo run --bin api_server
//
// Configuration: CONFIG_PATH (default config/config.yaml), then
// DATA_DIR / SUMMARY_FILE / AUTH_FILE / PORT override the file.

use anyhow::Context;
use sailing_metrics::config::DEFAULT_CONFIG_PATH;
use sailing_metrics::{create_router, AppConfig, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing (structured logging)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    // Default log level: info for our crate, warn for others
                    "sailing_metrics=info,tower_http=debug,axum=debug,warn".into()
                }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting API server...");

    let config_path = std::env::var("CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = AppConfig::load(&config_path)?;
    config.apply_overrides(|key| std::env::var(key).ok())?;

    tracing::info!("Configuration:");
    tracing::info!("  CONFIG_PATH: {:?}", config_path);
    tracing::info!("  DATA_DIR: {:?} ({:?} layout)", config.data.data_dir, config.data.layout);
    tracing::info!("  SUMMARY_FILE: {:?}", config.data.summary_file);
    tracing::info!("  AUTH_FILE: {:?}", config.auth.auth_file);
    tracing::info!("  PORT: {}", config.server.port);

    // Initialize application state (loads every sailing up front)
    tracing::info!("Initializing application state...");
    let state = AppState::load(&config).context("Failed to load sailing data")?;
    tracing::info!("Application state initialized successfully");

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
