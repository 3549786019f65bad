//! Database models
//!
//! Rows are read with `sqlx::FromRow`; ids are SQLite `INTEGER PRIMARY KEY`
//! values and therefore `i64`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One node of a program's evaluation hierarchy (`scorecard_structures`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StructureNode {
    pub id: i64,
    pub parent_id: Option<i64>,
    /// Syllabus leaf carrying a directly assignable score
    pub syllabus_id: Option<i64>,
}

/// A user's score on one syllabus leaf (`user_scores`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeafScore {
    pub syllabus_id: i64,
    pub score: f64,
}

/// Aggregated result for one user in one program (`scorecards`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Scorecard {
    pub id: i64,
    pub program_id: i64,
    pub user_id: i64,
    pub score: f64,
    pub is_outdated: bool,
    pub generated_at: NaiveDateTime,
}

/// Per-node line item of a scorecard (`scorecard_items`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScorecardItem {
    pub id: i64,
    pub scorecard_id: i64,
    pub structure_id: i64,
    pub score: f64,
}
