//! Configuration loading and root folder resolution
//!
//! The root folder holds the SQLite database. It is resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`SCORECARD_ROOT_FOLDER`)
//! 3. TOML config file (`root_folder` key)
//! 4. OS-dependent compiled default (fallback)
//!
//! Engine tuning values are not read here; they live in the `settings` table.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable consulted after the command-line argument
pub const ROOT_FOLDER_ENV: &str = "SCORECARD_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "scorecard.db";

/// Contents of the optional TOML config file
///
/// Unknown keys are ignored so the file can be shared with other tools.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
}

impl TomlConfig {
    /// Parse a config file from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

/// Resolves the root folder for one service
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    config_path: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            cli_arg: None,
            config_path: None,
        }
    }

    /// Root folder passed on the command line (priority 1)
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// Use an explicit config file instead of the platform locations
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Resolve the root folder. Never fails: a missing or broken config file
    /// only produces a warning and falls through to the compiled default.
    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            debug!("{}: root folder from command line", self.module_name);
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.is_empty() {
                debug!("{}: root folder from {}", self.module_name, ROOT_FOLDER_ENV);
                return PathBuf::from(path);
            }
        }

        if let Some(config_path) = self.config_path.clone().or_else(default_config_file) {
            match TomlConfig::load(&config_path) {
                Ok(TomlConfig { root_folder: Some(root), .. }) => {
                    debug!(
                        "{}: root folder from config file {}",
                        self.module_name,
                        config_path.display()
                    );
                    return root;
                }
                Ok(_) => {}
                Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(
                    "{}: ignoring config file {}: {}",
                    self.module_name,
                    config_path.display(),
                    e
                ),
            }
        }

        let root = default_root_folder();
        info!(
            "{}: no root folder configured, using default {}",
            self.module_name,
            root.display()
        );
        root
    }
}

/// Prepares a resolved root folder for use
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!("Created root folder: {}", self.root_folder.display());
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }
}

/// First existing platform config file, if any
fn default_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("scorecard").join("config.toml"));
    if let Some(path) = user_config.filter(|p| p.exists()) {
        return Some(path);
    }

    if cfg!(unix) {
        let system_config = PathBuf::from("/etc/scorecard/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// OS-dependent default root folder
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("scorecard"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/scorecard"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("scorecard"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/scorecard"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("scorecard"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\scorecard"))
    } else {
        PathBuf::from("./scorecard_data")
    }
}
