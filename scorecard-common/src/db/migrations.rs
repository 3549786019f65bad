//! Database schema migrations
//!
//! Versioned, idempotent migrations tracked in the `schema_version` table.
//! Tables are created with their current shape by `create_schema`; migrations
//! only bring databases created by older builds up to date.
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing migrations** - databases in the field depend on them
//! 2. **Always add new migrations** - one function per schema change
//! 3. **Check before altering** - every migration must be a no-op on a current schema
//! 4. **Use ALTER TABLE** - prefer ALTER TABLE over DROP/CREATE to preserve data

use crate::{Error, Result};
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    if !table_exists(pool, "schema_version").await? {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await.map_err(|e| Error::Migration {
            version: 1,
            reason: e.to_string(),
        })?;
        set_schema_version(pool, 1).await?;
        info!("✓ Migration v1 completed");
    }

    if current_version < 2 {
        migrate_v2(pool).await.map_err(|e| Error::Migration {
            version: 2,
            reason: e.to_string(),
        })?;
        set_schema_version(pool, 2).await?;
        info!("✓ Migration v2 completed");
    }

    info!("All migrations completed successfully");
    Ok(())
}

/// Migration v1: add `generated_at` to scorecards
///
/// Early scorecards tables had no generation timestamp. SQLite refuses a
/// non-constant default in ALTER TABLE, so existing rows are backfilled.
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v1: Add generated_at column to scorecards");

    if !table_exists(pool, "scorecards").await? {
        info!("  Scorecards table doesn't exist yet - skipping migration");
        return Ok(());
    }

    if column_exists(pool, "scorecards", "generated_at").await? {
        info!("  generated_at column already exists - skipping");
        return Ok(());
    }

    sqlx::query("ALTER TABLE scorecards ADD COLUMN generated_at TIMESTAMP")
        .execute(pool)
        .await?;
    sqlx::query("UPDATE scorecards SET generated_at = CURRENT_TIMESTAMP WHERE generated_at IS NULL")
        .execute(pool)
        .await?;

    info!("  ✓ Added generated_at column to scorecards table");
    Ok(())
}

/// Migration v2: enforce one item per (scorecard, structure)
///
/// Item upserts rely on this uniqueness. Older databases may hold duplicate
/// rows; the most recent row (highest id) of each pair is kept.
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v2: Unique scorecard items per structure");

    if !table_exists(pool, "scorecard_items").await? {
        info!("  Scorecard items table doesn't exist yet - skipping migration");
        return Ok(());
    }

    let mut tx = pool.begin().await?;

    let removed = sqlx::query(
        r#"
        DELETE FROM scorecard_items
        WHERE id NOT IN (
            SELECT MAX(id) FROM scorecard_items GROUP BY scorecard_id, structure_id
        )
        "#,
    )
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if removed > 0 {
        warn!("  Removed {} duplicate scorecard items", removed);
    }

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_scorecard_items_unique ON scorecard_items(scorecard_id, structure_id)",
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!("  ✓ Unique index on scorecard_items ensured");
    Ok(())
}

async fn table_exists(pool: &SqlitePool, table: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
    )
    .bind(table)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

async fn column_exists(pool: &SqlitePool, table: &str, column: &str) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?")
            .bind(table)
            .bind(column)
            .fetch_one(pool)
            .await?;

    Ok(count > 0)
}
