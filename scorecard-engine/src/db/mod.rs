//! Database access layer for scorecard-engine

pub mod scorecards;
pub mod settings;
pub mod snapshot;
