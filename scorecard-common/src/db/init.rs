//! Database initialization
//!
//! Opens (or creates) the SQLite database, creates missing tables, runs
//! pending migrations and seeds default settings. Every step is idempotent, so
//! calling [`init_database`] on an existing database is safe.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Default values for the `settings` table
///
/// Keys are read by the engine through `EngineConfig::from_database`.
pub const DEFAULT_SETTINGS: &[(&str, &str)] = &[
    ("recompute_task_timeout_ms", "30000"),
    ("snapshot_read_failure_policy", "degrade"),
    ("shutdown_drain_timeout_ms", "10000"),
];

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL lets API reads proceed while the recompute worker holds a write transaction
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;
    crate::db::migrations::run_migrations(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Create every table used by the scorecard services
///
/// Exposed separately from [`init_database`] so tests can build the schema on
/// an in-memory pool.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_settings_table(pool).await?;
    create_structures_table(pool).await?;
    create_user_scores_table(pool).await?;
    create_scorecards_table(pool).await?;
    create_scorecard_items_table(pool).await?;
    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the settings table
///
/// Stores engine configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_structures_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scorecard_structures (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            program_id INTEGER NOT NULL,
            parent_id INTEGER REFERENCES scorecard_structures(id) ON DELETE CASCADE,
            title TEXT NOT NULL DEFAULT '',
            syllabus_id INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_scorecard_structures_program ON scorecard_structures(program_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_user_scores_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_scores (
            user_id INTEGER NOT NULL,
            syllabus_id INTEGER NOT NULL,
            score REAL NOT NULL,
            UNIQUE (user_id, syllabus_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_scorecards_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scorecards (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            program_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            score REAL NOT NULL DEFAULT 0,
            is_outdated INTEGER NOT NULL DEFAULT 0,
            generated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_scorecards_program_user ON scorecards(program_id, user_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_scorecard_items_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scorecard_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            scorecard_id INTEGER NOT NULL REFERENCES scorecards(id) ON DELETE CASCADE,
            structure_id INTEGER NOT NULL REFERENCES scorecard_structures(id) ON DELETE CASCADE,
            score REAL NOT NULL,
            UNIQUE (scorecard_id, structure_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Seed default settings
///
/// Missing keys are inserted; keys holding NULL are reset to the default.
/// Existing values are never overwritten.
pub async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    for (key, default_value) in DEFAULT_SETTINGS {
        ensure_setting(pool, key, default_value).await?;
    }
    Ok(())
}

async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let inserted = sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(default_value)
        .execute(pool)
        .await?
        .rows_affected();

    if inserted > 0 {
        info!("Initialized setting '{}' with default value: {}", key, default_value);
        return Ok(());
    }

    let reset = sqlx::query("UPDATE settings SET value = ? WHERE key = ? AND value IS NULL")
        .bind(default_value)
        .bind(key)
        .execute(pool)
        .await?
        .rows_affected();

    if reset > 0 {
        info!("Reset NULL setting '{}' to default value: {}", key, default_value);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_test_db() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_schema_is_idempotent() {
        let pool = setup_test_db().await;

        create_schema(&pool).await.unwrap();
        create_schema(&pool).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        assert_eq!(
            tables,
            vec![
                "schema_version",
                "scorecard_items",
                "scorecard_structures",
                "scorecards",
                "settings",
                "user_scores",
            ]
        );
    }

    #[tokio::test]
    async fn test_scorecard_items_unique_per_structure() {
        let pool = setup_test_db().await;
        create_schema(&pool).await.unwrap();

        sqlx::query("INSERT INTO scorecard_structures (id, program_id) VALUES (1, 1)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO scorecards (id, program_id, user_id) VALUES (1, 1, 1)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO scorecard_items (scorecard_id, structure_id, score) VALUES (1, 1, 10)")
            .execute(&pool)
            .await
            .unwrap();

        let duplicate = sqlx::query(
            "INSERT INTO scorecard_items (scorecard_id, structure_id, score) VALUES (1, 1, 20)",
        )
        .execute(&pool)
        .await;

        assert!(duplicate.is_err(), "duplicate (scorecard, structure) pair must be rejected");
    }

    #[tokio::test]
    async fn test_null_setting_reset_to_default() {
        let pool = setup_test_db().await;
        create_schema(&pool).await.unwrap();

        sqlx::query("INSERT INTO settings (key, value) VALUES ('recompute_task_timeout_ms', NULL)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO settings (key, value) VALUES ('shutdown_drain_timeout_ms', '500')")
            .execute(&pool)
            .await
            .unwrap();

        init_default_settings(&pool).await.unwrap();

        let timeout: String =
            sqlx::query_scalar("SELECT value FROM settings WHERE key = 'recompute_task_timeout_ms'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(timeout, "30000");

        let drain: String =
            sqlx::query_scalar("SELECT value FROM settings WHERE key = 'shutdown_drain_timeout_ms'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(drain, "500", "existing values must not be overwritten");
    }
}
