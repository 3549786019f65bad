//! scorecard-engine - Main entry point
//!
//! Composition root: resolves the root folder, opens the database, starts the
//! recompute worker and serves the HTTP trigger surface until a shutdown
//! signal arrives. Queued recomputes are drained before the process exits.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scorecard_common::config::{RootFolderInitializer, RootFolderResolver};
use scorecard_common::db::init_database;
use scorecard_engine::{build_router, AppState, EngineConfig, RecomputeQueue, ScorecardAggregator};

/// Command-line arguments for scorecard-engine
#[derive(Parser, Debug)]
#[command(name = "scorecard-engine")]
#[command(about = "Hierarchical scorecard aggregation service")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5780", env = "SCORECARD_PORT")]
    port: u16,

    /// Root folder holding scorecard.db
    #[arg(short, long, env = "SCORECARD_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scorecard_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting scorecard-engine v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();

    let root_folder = RootFolderResolver::new("scorecard-engine")
        .with_cli_arg(args.root_folder)
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to prepare root folder")?;

    let db_path = initializer.database_path();
    info!("Database path: {}", db_path.display());

    let pool = init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    let config = EngineConfig::from_database(&pool).await;
    info!(
        "Engine config: read failure policy {}, shutdown drain {}ms",
        config.read_failure_policy,
        config.shutdown_drain_timeout.as_millis()
    );

    let aggregator = Arc::new(ScorecardAggregator::new(
        pool.clone(),
        config.read_failure_policy,
    ));
    let (queue, worker) = RecomputeQueue::start(aggregator, config.task_timeout);

    let app = build_router(AppState::new(pool.clone(), queue));

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("scorecard-engine listening on http://{}", addr);

    // The router owns the last queue handles; they drop when serve returns
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("HTTP server stopped, draining recompute queue");
    match tokio::time::timeout(config.shutdown_drain_timeout, worker).await {
        Ok(Ok(())) => info!("Recompute queue drained"),
        Ok(Err(e)) => warn!("Recompute worker ended abnormally: {}", e),
        Err(_) => warn!(
            "Recompute queue not drained within {}ms; remaining requests are dropped",
            config.shutdown_drain_timeout.as_millis()
        ),
    }

    pool.close().await;
    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
