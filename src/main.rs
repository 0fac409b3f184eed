//! Statistics sync server.
//!
//! Serves the dashboard API under `/api`: the SSE stream, on-demand
//! snapshots, the manual change trigger and a health probe.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use stats_sync::adapters::{
    serve_until, stats_router, BroadcastManager, InMemoryChangeBus, PostgresSnapshotProvider,
    StatsAppState,
};
use stats_sync::config::{AppConfig, LogFormat, ServerConfig};
use stats_sync::ports::{ChangePublisher, SnapshotProvider};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config.server);
    config.validate().context("Invalid configuration")?;

    tracing::info!(
        environment = ?config.server.environment,
        "Starting stats-sync server"
    );

    let pool = config
        .database
        .pool_options()
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!(
        max_connections = config.database.max_connections,
        "Database pool ready"
    );

    let provider: Arc<dyn SnapshotProvider> = Arc::new(PostgresSnapshotProvider::new(pool));
    let bus = InMemoryChangeBus::new();
    let changes: Arc<dyn ChangePublisher> = Arc::new(bus.clone());

    let manager = Arc::new(BroadcastManager::new(
        provider.clone(),
        config.stream.broadcast_settings(),
    ));
    manager.start(&bus);

    let state = StatsAppState {
        manager: manager.clone(),
        provider,
        changes,
        stream: config.stream.clone(),
    };
    let app = stats_router(state, &config.server);

    let addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(%addr, "Listening; API available under /api");

    serve_until(listener, app, manager, shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped gracefully");
    Ok(())
}

fn init_tracing(server: &ServerConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&server.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match server.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
