//! Error types for scorecard-engine
//!
//! None of these reach the caller that enqueued a recompute: the worker logs
//! them and moves on. They are returned by the aggregation steps so each
//! failure is reported once, at the point the task ends.

use thiserror::Error;

use crate::aggregation::reducer::ReduceError;

/// Main error type for scorecard-engine
#[derive(Error, Debug)]
pub enum Error {
    /// Query or transaction failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Invalid engine setting
    #[error("Configuration error: {0}")]
    Config(String),

    /// Referenced scorecard or program row is missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// One half of the snapshot could not be read (fail-fast policy)
    #[error("Snapshot read failed: {0}")]
    Snapshot(String),

    /// Structure tree is malformed
    #[error(transparent)]
    Reduce(#[from] ReduceError),
}

/// Convenience Result type using the engine Error
pub type Result<T> = std::result::Result<T, Error>;
