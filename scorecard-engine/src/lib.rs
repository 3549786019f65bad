//! scorecard-engine library
//!
//! Hierarchical scorecard aggregation driven by a single-worker recompute
//! queue, plus the HTTP surface that feeds it.

use axum::Router;
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

pub mod aggregation;
pub mod api;
pub mod config;
pub mod db;
pub mod error;

pub use aggregation::{RecomputeQueue, RecomputeRequest, ScorecardAggregator};
pub use config::{EngineConfig, ReadFailurePolicy};
pub use error::{Error, Result};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Enqueue handle; the worker drains after the last clone is dropped
    pub queue: RecomputeQueue,
}

impl AppState {
    pub fn new(db: SqlitePool, queue: RecomputeQueue) -> Self {
        Self { db, queue }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    let api = Router::new()
        .route("/api/queue", get(api::queue_stats))
        .route(
            "/api/programs/:program_id/scorecards/generate",
            post(api::generate_program_scorecards),
        )
        .route(
            "/api/programs/:program_id/scorecards/:scorecard_id/generate",
            post(api::generate_scorecard),
        )
        .route(
            "/api/programs/:program_id/scorecards/:scorecard_id",
            get(api::get_scorecard),
        );

    Router::new()
        .merge(api)
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
