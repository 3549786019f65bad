//! # Scorecard Common Library
//!
//! Shared code for the scorecard services:
//! - Database bootstrap (schema, migrations, default settings)
//! - Persisted row models
//! - Configuration and root folder resolution
//! - Common error type

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
