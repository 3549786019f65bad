//! Engine configuration
//!
//! Tuning values are read from the `settings` table at startup. Missing or
//! unparsable values fall back to defaults with a warning; the engine never
//! refuses to start over a bad setting.

use sqlx::{Pool, Sqlite};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::db::settings::get_setting;
use crate::error::Error;

/// What the snapshot loader does when one of its two reads fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadFailurePolicy {
    /// Log the failure and continue with an empty set for that half
    #[default]
    Degrade,
    /// Abort the task; the scorecard keeps its outdated flag
    FailFast,
}

impl FromStr for ReadFailurePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "degrade" => Ok(Self::Degrade),
            "fail_fast" | "fail-fast" => Ok(Self::FailFast),
            other => Err(Error::Config(format!("Unknown read failure policy: {}", other))),
        }
    }
}

impl fmt::Display for ReadFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Degrade => write!(f, "degrade"),
            Self::FailFast => write!(f, "fail_fast"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Deadline for one aggregation task; `None` disables it
    pub task_timeout: Option<Duration>,

    pub read_failure_policy: ReadFailurePolicy,

    /// How long shutdown waits for queued recomputes to finish
    pub shutdown_drain_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            task_timeout: Some(Duration::from_millis(30_000)),
            read_failure_policy: ReadFailurePolicy::Degrade,
            shutdown_drain_timeout: Duration::from_millis(10_000),
        }
    }
}

impl EngineConfig {
    /// Load engine configuration from database settings, falling back to
    /// defaults per key
    pub async fn from_database(db: &Pool<Sqlite>) -> Self {
        let mut config = Self::default();

        if let Some(ms) = load_or_warn::<u64>(db, "recompute_task_timeout_ms").await {
            config.task_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }

        if let Some(policy) =
            load_or_warn::<ReadFailurePolicy>(db, "snapshot_read_failure_policy").await
        {
            config.read_failure_policy = policy;
        }

        if let Some(ms) = load_or_warn::<u64>(db, "shutdown_drain_timeout_ms").await {
            config.shutdown_drain_timeout = Duration::from_millis(ms);
        }

        config
    }
}

async fn load_or_warn<T: FromStr>(db: &Pool<Sqlite>, key: &str) -> Option<T> {
    match get_setting::<T>(db, key).await {
        Ok(value) => value,
        Err(e) => {
            warn!("Using default for setting '{}': {}", key, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::settings::set_setting;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> Pool<Sqlite> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        scorecard_common::db::create_settings_table(&pool).await.unwrap();
        pool
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("degrade".parse::<ReadFailurePolicy>().unwrap(), ReadFailurePolicy::Degrade);
        assert_eq!(" FAIL_FAST ".parse::<ReadFailurePolicy>().unwrap(), ReadFailurePolicy::FailFast);
        assert!("retry".parse::<ReadFailurePolicy>().is_err());
        assert_eq!(ReadFailurePolicy::FailFast.to_string(), "fail_fast");
    }

    #[tokio::test]
    async fn test_empty_settings_use_defaults() {
        let db = setup_test_db().await;

        assert_eq!(EngineConfig::from_database(&db).await, EngineConfig::default());
    }

    #[tokio::test]
    async fn test_settings_override_defaults() {
        let db = setup_test_db().await;
        set_setting(&db, "recompute_task_timeout_ms", 0).await.unwrap();
        set_setting(&db, "snapshot_read_failure_policy", "fail_fast").await.unwrap();
        set_setting(&db, "shutdown_drain_timeout_ms", 250).await.unwrap();

        let config = EngineConfig::from_database(&db).await;

        assert_eq!(config.task_timeout, None);
        assert_eq!(config.read_failure_policy, ReadFailurePolicy::FailFast);
        assert_eq!(config.shutdown_drain_timeout, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_bad_setting_falls_back_per_key() {
        let db = setup_test_db().await;
        set_setting(&db, "recompute_task_timeout_ms", "-5").await.unwrap();
        set_setting(&db, "snapshot_read_failure_policy", "fail_fast").await.unwrap();

        let config = EngineConfig::from_database(&db).await;

        assert_eq!(config.task_timeout, EngineConfig::default().task_timeout);
        assert_eq!(config.read_failure_policy, ReadFailurePolicy::FailFast);
    }
}
