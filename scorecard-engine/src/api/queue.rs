//! Recompute queue inspection

use axum::{extract::State, Json};

use crate::aggregation::QueueStats;
use crate::AppState;

/// GET /api/queue
///
/// Pending count, the running request and outcome counters.
pub async fn queue_stats(State(state): State<AppState>) -> Json<QueueStats> {
    Json(state.queue.stats())
}
