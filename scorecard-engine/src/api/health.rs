//! Health check endpoint
//!
//! Reports build identity, database reachability and recompute queue load.
//! An unreachable database answers 503 so supervisors can restart the process.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use tracing::warn;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok" or "degraded"
    pub status: String,
    pub module: String,
    pub version: String,
    pub git_hash: String,
    pub database: bool,
    pub queue_pending: usize,
    pub queue_running: bool,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => true,
        Err(e) => {
            warn!("Health check: database unreachable: {}", e);
            false
        }
    };
    let stats = state.queue.stats();

    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if database { "ok" } else { "degraded" }.to_string(),
            module: "scorecard-engine".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            git_hash: env!("GIT_HASH").to_string(),
            database,
            queue_pending: stats.pending,
            queue_running: stats.running.is_some(),
        }),
    )
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
