//! HTTP API handlers for scorecard-engine

pub mod health;
pub mod queue;
pub mod scorecards;

pub use health::health_routes;
pub use queue::queue_stats;
pub use scorecards::{generate_program_scorecards, generate_scorecard, get_scorecard, ApiError};
