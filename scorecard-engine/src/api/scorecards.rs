//! Scorecard generation triggers and lookup
//!
//! Generation endpoints answer as soon as requests are queued. The outcome of
//! a recompute is only visible later through the scorecard row itself.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use scorecard_common::db::{Scorecard, ScorecardItem};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};

use crate::aggregation::RecomputeRequest;
use crate::db::scorecards;
use crate::error::Error;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub enqueued: usize,
}

#[derive(Debug, Serialize)]
pub struct ScorecardResponse {
    #[serde(flatten)]
    pub scorecard: Scorecard,
    pub items: Vec<ScorecardItem>,
    pub is_in_queue: bool,
}

/// POST /api/programs/:program_id/scorecards/generate
///
/// Queues one recompute per user holding a score on any of the program's
/// syllabus leaves. Users with an existing scorecard get it updated; the rest
/// get a new one.
pub async fn generate_program_scorecards(
    State(state): State<AppState>,
    Path(program_id): Path<i64>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let targets = scorecards::find_generation_targets(&state.db, program_id).await?;

    for &(user_id, scorecard_id) in &targets {
        state
            .queue
            .enqueue(RecomputeRequest::new(program_id, user_id, scorecard_id));
    }

    info!(
        "Queued {} scorecard recomputes for program {}",
        targets.len(),
        program_id
    );

    Ok(Json(GenerateResponse {
        success: true,
        enqueued: targets.len(),
    }))
}

/// POST /api/programs/:program_id/scorecards/:scorecard_id/generate
pub async fn generate_scorecard(
    State(state): State<AppState>,
    Path((program_id, scorecard_id)): Path<(i64, i64)>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let user_id = scorecards::find_scorecard_user(&state.db, program_id, scorecard_id)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "Scorecard {} in program {}",
                scorecard_id, program_id
            ))
        })?;

    state
        .queue
        .enqueue(RecomputeRequest::new(program_id, user_id, scorecard_id));

    Ok(Json(GenerateResponse {
        success: true,
        enqueued: 1,
    }))
}

/// GET /api/programs/:program_id/scorecards/:scorecard_id
pub async fn get_scorecard(
    State(state): State<AppState>,
    Path((program_id, scorecard_id)): Path<(i64, i64)>,
) -> Result<Json<ScorecardResponse>, ApiError> {
    let scorecard = scorecards::get_scorecard(&state.db, scorecard_id)
        .await?
        .filter(|s| s.program_id == program_id)
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "Scorecard {} in program {}",
                scorecard_id, program_id
            ))
        })?;

    let items = scorecards::list_items(&state.db, scorecard_id).await?;

    Ok(Json(ScorecardResponse {
        scorecard,
        items,
        is_in_queue: state.queue.is_in_queue(scorecard_id),
    }))
}

/// Scorecard API errors
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Internal(String),
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::NotFound(what) => ApiError::NotFound(what),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, format!("Not found: {}", what)),
            ApiError::Internal(msg) => {
                error!("Scorecard API error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
