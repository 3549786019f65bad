//! Aggregation task
//!
//! One run produces the scorecard for one (program, user) pair: load the
//! snapshot, reduce the structure tree, then write the scorecard header and
//! its second-level items in a single transaction.

use async_trait::async_trait;
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use tracing::{error, info};

use scorecard_common::db::StructureNode;

use super::queue::{RecomputeHandler, RecomputeRequest, TaskOutcome};
use super::reducer::{NodeInput, Reducer};
use crate::config::ReadFailurePolicy;
use crate::db::{scorecards, snapshot};
use crate::error::Result;

/// Why a run wrote nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoStructures,
    NoLeafScores,
}

/// Result of a successful run
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationOutcome {
    Skipped(SkipReason),
    Written {
        scorecard_id: i64,
        score: f64,
        items: usize,
    },
}

/// Scores computed before anything is written
#[derive(Debug, Clone, PartialEq)]
pub struct ReducedScorecard {
    /// Mean of the root scores
    pub score: f64,
    /// `(structure_id, score)` for each direct child of a root
    pub items: Vec<(i64, f64)>,
}

/// Reduce a snapshot into the overall score and the persisted line items
///
/// A node's starting score is its leaf score when it references a scored
/// syllabus, else 0. Only nodes one level below a root become items; deeper
/// levels are folded into their second-level ancestor.
pub fn reduce_snapshot(
    structures: &[StructureNode],
    leaf_scores: &HashMap<i64, f64>,
) -> Result<ReducedScorecard> {
    let mut reducer = Reducer::new();
    reducer.set_nodes(structures.iter().map(|s| NodeInput {
        id: s.id,
        parent_id: s.parent_id,
        score: s
            .syllabus_id
            .and_then(|syllabus_id| leaf_scores.get(&syllabus_id).copied())
            .unwrap_or(0.0),
    }));
    reducer.reduce()?;

    let roots = reducer.roots();
    let score = if roots.is_empty() {
        0.0
    } else {
        roots.iter().map(|root| root.score()).sum::<f64>() / roots.len() as f64
    };

    let items = roots
        .iter()
        .flat_map(|root| reducer.children_of(root.id()))
        .map(|child| (child.id(), child.score()))
        .collect();

    Ok(ReducedScorecard { score, items })
}

/// Runs aggregation tasks against the database
#[derive(Clone)]
pub struct ScorecardAggregator {
    db: Pool<Sqlite>,
    read_failure_policy: ReadFailurePolicy,
}

impl ScorecardAggregator {
    pub fn new(db: Pool<Sqlite>, read_failure_policy: ReadFailurePolicy) -> Self {
        Self {
            db,
            read_failure_policy,
        }
    }

    /// Aggregate and persist one scorecard
    ///
    /// `scorecard_id` of `None` inserts a new scorecard; `Some(id)` updates
    /// that row and clears its outdated flag. Any write failure rolls back
    /// the whole transaction.
    pub async fn run(
        &self,
        program_id: i64,
        user_id: i64,
        scorecard_id: Option<i64>,
    ) -> Result<AggregationOutcome> {
        let snapshot =
            snapshot::load_snapshot(&self.db, program_id, user_id, self.read_failure_policy)
                .await?;

        if snapshot.structures.is_empty() {
            return Ok(AggregationOutcome::Skipped(SkipReason::NoStructures));
        }
        if snapshot.leaf_scores.is_empty() {
            return Ok(AggregationOutcome::Skipped(SkipReason::NoLeafScores));
        }

        let reduced = reduce_snapshot(&snapshot.structures, &snapshot.leaf_scores)?;

        // Dropping the transaction on an early return rolls it back
        let mut tx = self.db.begin().await?;

        let scorecard_id = match scorecard_id {
            None => scorecards::insert_scorecard(&mut tx, program_id, user_id, reduced.score).await?,
            Some(id) => {
                scorecards::update_scorecard(&mut tx, id, reduced.score).await?;
                id
            }
        };

        scorecards::upsert_items(&mut tx, scorecard_id, &reduced.items).await?;

        tx.commit().await?;

        Ok(AggregationOutcome::Written {
            scorecard_id,
            score: reduced.score,
            items: reduced.items.len(),
        })
    }
}

#[async_trait]
impl RecomputeHandler for ScorecardAggregator {
    async fn handle(&self, request: RecomputeRequest) -> TaskOutcome {
        match self
            .run(request.program_id, request.user_id, request.scorecard_id)
            .await
        {
            Ok(AggregationOutcome::Written {
                scorecard_id,
                score,
                items,
            }) => {
                info!(
                    "Scorecard {} generated for program {} user {}: score {:.2}, {} items",
                    scorecard_id, request.program_id, request.user_id, score, items
                );
                TaskOutcome::Completed
            }
            Ok(AggregationOutcome::Skipped(reason)) => {
                info!(
                    "Nothing to aggregate for program {} user {} ({:?})",
                    request.program_id, request.user_id, reason
                );
                TaskOutcome::Skipped
            }
            Err(e) => {
                error!(
                    "Scorecard generation failed for program {} user {} (scorecard {:?}): {}",
                    request.program_id, request.user_id, request.scorecard_id, e
                );
                TaskOutcome::Failed
            }
        }
    }
}
