//! Scorecard persistence
//!
//! Write helpers take an open transaction so the header and its items commit
//! or roll back together. Read helpers take the pool.

use scorecard_common::db::{Scorecard, ScorecardItem};
use sqlx::{Pool, QueryBuilder, Sqlite, Transaction};

use crate::error::{Error, Result};

/// Insert a new scorecard and return its id
pub async fn insert_scorecard(
    tx: &mut Transaction<'_, Sqlite>,
    program_id: i64,
    user_id: i64,
    score: f64,
) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO scorecards (program_id, user_id, score, is_outdated, generated_at)
        VALUES (?, ?, ?, 0, CURRENT_TIMESTAMP)
        RETURNING id
        "#,
    )
    .bind(program_id)
    .bind(user_id)
    .bind(score)
    .fetch_one(&mut **tx)
    .await?;

    Ok(id)
}

/// Store a new score on an existing scorecard and clear its outdated flag
///
/// Returns [`Error::NotFound`] when no row has this id.
pub async fn update_scorecard(
    tx: &mut Transaction<'_, Sqlite>,
    scorecard_id: i64,
    score: f64,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE scorecards
        SET score = ?, is_outdated = 0, generated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(score)
    .bind(scorecard_id)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("scorecard {}", scorecard_id)));
    }

    Ok(())
}

/// Rows per item upsert statement; three bound parameters each keeps every
/// statement well under SQLite's bind-parameter limit
pub const ITEM_BATCH_ROWS: usize = 300;

/// Upsert `(structure_id, score)` items for a scorecard
///
/// Items are written in batches of [`ITEM_BATCH_ROWS`] inside the caller's
/// transaction. Existing items for the same structure node are overwritten.
pub async fn upsert_items(
    tx: &mut Transaction<'_, Sqlite>,
    scorecard_id: i64,
    items: &[(i64, f64)],
) -> Result<()> {
    for batch in items.chunks(ITEM_BATCH_ROWS) {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT INTO scorecard_items (scorecard_id, structure_id, score) ");
        builder.push_values(batch, |mut row, (structure_id, score)| {
            row.push_bind(scorecard_id)
                .push_bind(*structure_id)
                .push_bind(*score);
        });
        builder.push(
            " ON CONFLICT (scorecard_id, structure_id) DO UPDATE SET score = excluded.score",
        );

        builder.build().execute(&mut **tx).await?;
    }

    Ok(())
}

pub async fn get_scorecard(db: &Pool<Sqlite>, scorecard_id: i64) -> Result<Option<Scorecard>> {
    let scorecard = sqlx::query_as::<_, Scorecard>(
        r#"
        SELECT id, program_id, user_id, score, is_outdated, generated_at
        FROM scorecards
        WHERE id = ?
        "#,
    )
    .bind(scorecard_id)
    .fetch_optional(db)
    .await?;

    Ok(scorecard)
}

/// Items of a scorecard ordered by structure node id
pub async fn list_items(db: &Pool<Sqlite>, scorecard_id: i64) -> Result<Vec<ScorecardItem>> {
    let items = sqlx::query_as::<_, ScorecardItem>(
        r#"
        SELECT id, scorecard_id, structure_id, score
        FROM scorecard_items
        WHERE scorecard_id = ?
        ORDER BY structure_id
        "#,
    )
    .bind(scorecard_id)
    .fetch_all(db)
    .await?;

    Ok(items)
}

/// User owning `scorecard_id` within `program_id`, if the pair matches
pub async fn find_scorecard_user(
    db: &Pool<Sqlite>,
    program_id: i64,
    scorecard_id: i64,
) -> Result<Option<i64>> {
    let user_id = sqlx::query_scalar(
        r#"
        SELECT user_id
        FROM scorecards
        WHERE program_id = ? AND id = ?
        "#,
    )
    .bind(program_id)
    .bind(scorecard_id)
    .fetch_optional(db)
    .await?;

    Ok(user_id)
}

/// Users holding a score on any leaf of the program's structure, each with
/// their existing scorecard id in that program (0 when none exists yet)
pub async fn find_generation_targets(db: &Pool<Sqlite>, program_id: i64) -> Result<Vec<(i64, i64)>> {
    let rows = sqlx::query_as::<_, (i64, i64)>(
        r#"
        SELECT DISTINCT us.user_id, COALESCE(s.id, 0)
        FROM scorecard_structures ss
        JOIN user_scores us ON us.syllabus_id = ss.syllabus_id
        LEFT JOIN scorecards s ON s.user_id = us.user_id AND s.program_id = ss.program_id
        WHERE ss.program_id = ?
        ORDER BY us.user_id
        "#,
    )
    .bind(program_id)
    .fetch_all(db)
    .await?;

    Ok(rows)
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
        sqlx::query(
            "INSERT INTO scorecard_structures (id, program_id, parent_id) VALUES (1, 1, NULL), (2, 1, 1), (3, 1, 1)",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    #[tokio::test]
    async fn test_insert_then_upsert_items() {
        let db = setup_test_db().await;

        let mut tx = db.begin().await.unwrap();
        let id = insert_scorecard(&mut tx, 1, 9, 50.0).await.unwrap();
        upsert_items(&mut tx, id, &[(2, 0.0), (3, 100.0)]).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = db.begin().await.unwrap();
        update_scorecard(&mut tx, id, 70.0).await.unwrap();
        upsert_items(&mut tx, id, &[(2, 40.0), (3, 100.0)]).await.unwrap();
        tx.commit().await.unwrap();

        let scorecard = get_scorecard(&db, id).await.unwrap().unwrap();
        assert_eq!(scorecard.score, 70.0);
        assert!(!scorecard.is_outdated);

        let items = list_items(&db, id).await.unwrap();
        let pairs: Vec<(i64, f64)> = items.iter().map(|i| (i.structure_id, i.score)).collect();
        assert_eq!(pairs, vec![(2, 40.0), (3, 100.0)]);
    }

    #[tokio::test]
    async fn test_upsert_items_beyond_one_batch() {
        let db = setup_test_db().await;
        // 12,000 second-level nodes under root 1 (ids 4..=12003)
        sqlx::query(
            r#"
            WITH RECURSIVE seq(x) AS (SELECT 4 UNION ALL SELECT x + 1 FROM seq WHERE x < 12003)
            INSERT INTO scorecard_structures (id, program_id, parent_id) SELECT x, 1, 1 FROM seq
            "#,
        )
        .execute(&db)
        .await
        .unwrap();
        let items: Vec<(i64, f64)> = (4..=12003).map(|id| (id, (id % 100) as f64)).collect();

        let mut tx = db.begin().await.unwrap();
        let id = insert_scorecard(&mut tx, 1, 9, 0.0).await.unwrap();
        upsert_items(&mut tx, id, &items).await.unwrap();
        // Second pass overwrites across batch boundaries
        upsert_items(&mut tx, id, &items[ITEM_BATCH_ROWS - 1..ITEM_BATCH_ROWS + 1])
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let stored = list_items(&db, id).await.unwrap();
        assert_eq!(stored.len(), items.len());
        assert_eq!(stored.first().map(|i| i.structure_id), Some(4));
        assert_eq!(stored.last().map(|i| (i.structure_id, i.score)), Some((12003, 3.0)));
    }

    #[tokio::test]
    async fn test_update_missing_scorecard_is_not_found() {
        let db = setup_test_db().await;

        let mut tx = db.begin().await.unwrap();
        let result = update_scorecard(&mut tx, 77, 10.0).await;

        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_find_generation_targets() {
        let db = setup_test_db().await;
        sqlx::query("UPDATE scorecard_structures SET syllabus_id = 10 WHERE id = 2")
            .execute(&db)
            .await
            .unwrap();
        sqlx::query("INSERT INTO user_scores (user_id, syllabus_id, score) VALUES (4, 10, 1), (5, 10, 2), (6, 99, 3)")
            .execute(&db)
            .await
            .unwrap();
        sqlx::query("INSERT INTO scorecards (id, program_id, user_id) VALUES (8, 1, 5), (9, 2, 4)")
            .execute(&db)
            .await
            .unwrap();

        let targets = find_generation_targets(&db, 1).await.unwrap();

        assert_eq!(targets, vec![(4, 0), (5, 8)]);
        assert_eq!(find_scorecard_user(&db, 1, 8).await.unwrap(), Some(5));
        assert_eq!(find_scorecard_user(&db, 1, 9).await.unwrap(), None);
    }
}
