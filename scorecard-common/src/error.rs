//! Error type shared by the scorecard crates

use thiserror::Error;

/// Result alias used across `scorecard-common`
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Query, connection or transaction failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Filesystem failure while preparing the root folder or database file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed TOML configuration file
    #[error("Config file parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A schema migration could not be applied
    #[error("Migration v{version} failed: {reason}")]
    Migration { version: i32, reason: String },

    /// Referenced row does not exist
    #[error("Not found: {0}")]
    NotFound(String),
}
