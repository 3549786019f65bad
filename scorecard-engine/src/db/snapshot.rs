//! Snapshot loader
//!
//! Reads a program's structure tree and a user's leaf scores in parallel. The
//! two reads are independent; both are awaited before the snapshot is
//! returned. What happens when one of them fails is decided by
//! [`ReadFailurePolicy`].

use scorecard_common::db::{LeafScore, StructureNode};
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use tracing::{debug, error};

use crate::config::ReadFailurePolicy;
use crate::error::{Error, Result};

/// Structure and scores for one (program, user) pair
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Structure nodes in id order
    pub structures: Vec<StructureNode>,
    /// syllabus id → score
    pub leaf_scores: HashMap<i64, f64>,
}

/// Every structure node of a program
pub async fn load_structures(db: &Pool<Sqlite>, program_id: i64) -> Result<Vec<StructureNode>> {
    let rows = sqlx::query_as::<_, StructureNode>(
        r#"
        SELECT id, parent_id, syllabus_id
        FROM scorecard_structures
        WHERE program_id = ?
        ORDER BY id
        "#,
    )
    .bind(program_id)
    .fetch_all(db)
    .await?;

    Ok(rows)
}

/// Every leaf score recorded for a user
pub async fn load_leaf_scores(db: &Pool<Sqlite>, user_id: i64) -> Result<HashMap<i64, f64>> {
    let rows = sqlx::query_as::<_, LeafScore>(
        r#"
        SELECT syllabus_id, score
        FROM user_scores
        WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.syllabus_id, row.score))
        .collect())
}

/// Fetch structure and scores concurrently
pub async fn load_snapshot(
    db: &Pool<Sqlite>,
    program_id: i64,
    user_id: i64,
    policy: ReadFailurePolicy,
) -> Result<Snapshot> {
    let (structures, leaf_scores) = tokio::join!(
        load_structures(db, program_id),
        load_leaf_scores(db, user_id),
    );

    let structures = settle(structures, policy, "structures", program_id, user_id)?;
    let leaf_scores = settle(leaf_scores, policy, "leaf scores", program_id, user_id)?;

    debug!(
        "Snapshot for program {} user {}: {} structure nodes, {} leaf scores",
        program_id,
        user_id,
        structures.len(),
        leaf_scores.len()
    );

    Ok(Snapshot {
        structures,
        leaf_scores,
    })
}

/// Apply the read-failure policy to one half of the snapshot
fn settle<T: Default>(
    result: Result<T>,
    policy: ReadFailurePolicy,
    what: &str,
    program_id: i64,
    user_id: i64,
) -> Result<T> {
    match (result, policy) {
        (Ok(value), _) => Ok(value),
        (Err(e), ReadFailurePolicy::Degrade) => {
            error!(
                "Failed to load {} for program {} user {} (continuing with empty set): {}",
                what, program_id, user_id, e
            );
            Ok(T::default())
        }
        (Err(e), ReadFailurePolicy::FailFast) => Err(Error::Snapshot(format!(
            "{} for program {} user {}: {}",
            what, program_id, user_id, e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> Pool<Sqlite> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        scorecard_common::db::create_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_snapshot_filters_by_program_and_user() {
        let db = setup_test_db().await;

        sqlx::query(
            r#"
            INSERT INTO scorecard_structures (id, program_id, parent_id, syllabus_id) VALUES
                (1, 1, NULL, NULL),
                (2, 1, 1, 10),
                (3, 2, NULL, 11)
            "#,
        )
        .execute(&db)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO user_scores (user_id, syllabus_id, score) VALUES (5, 10, 75), (6, 10, 20)",
        )
        .execute(&db)
        .await
        .unwrap();

        let snapshot = load_snapshot(&db, 1, 5, ReadFailurePolicy::FailFast)
            .await
            .unwrap();

        let ids: Vec<i64> = snapshot.structures.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(snapshot.structures[1].parent_id, Some(1));
        assert_eq!(snapshot.structures[1].syllabus_id, Some(10));
        assert_eq!(snapshot.leaf_scores.len(), 1);
        assert_eq!(snapshot.leaf_scores[&10], 75.0);
    }

    #[tokio::test]
    async fn test_degrade_policy_treats_failed_read_as_empty() {
        let db = setup_test_db().await;
        sqlx::query("INSERT INTO scorecard_structures (id, program_id) VALUES (1, 1)")
            .execute(&db)
            .await
            .unwrap();
        sqlx::query("DROP TABLE user_scores").execute(&db).await.unwrap();

        let snapshot = load_snapshot(&db, 1, 5, ReadFailurePolicy::Degrade)
            .await
            .unwrap();

        assert_eq!(snapshot.structures.len(), 1);
        assert!(snapshot.leaf_scores.is_empty());
    }

    #[tokio::test]
    async fn test_fail_fast_policy_reports_failed_read() {
        let db = setup_test_db().await;
        sqlx::query("DROP TABLE scorecard_structures")
            .execute(&db)
            .await
            .unwrap();

        let result = load_snapshot(&db, 1, 5, ReadFailurePolicy::FailFast).await;

        assert!(matches!(result, Err(Error::Snapshot(_))));
    }
}
