//! Scorecard aggregation
//!
//! - `reducer`: pure bottom-up tree reduction
//! - `task`: snapshot → reduce → transactional write for one (program, user)
//! - `queue`: single-worker FIFO that runs tasks one at a time

pub mod queue;
pub mod reducer;
pub mod task;

pub use queue::{QueueStats, RecomputeHandler, RecomputeQueue, RecomputeRequest, TaskOutcome};
pub use reducer::{AggregatedNode, NodeInput, ReduceError, Reducer};
pub use task::{reduce_snapshot, AggregationOutcome, ReducedScorecard, ScorecardAggregator, SkipReason};
