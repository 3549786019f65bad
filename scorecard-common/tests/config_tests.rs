//! Tests for root folder resolution
//!
//! Tests that touch SCORECARD_ROOT_FOLDER are marked #[serial] so they do not
//! race on the process environment.

use scorecard_common::config::{
    RootFolderInitializer, RootFolderResolver, TomlConfig, DATABASE_FILE_NAME, ROOT_FOLDER_ENV,
};
use serial_test::serial;
use std::env;
use std::path::PathBuf;

#[test]
#[serial]
fn test_cli_argument_has_highest_priority() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/scorecard-from-env");

    let root = RootFolderResolver::new("test")
        .with_cli_arg(Some(PathBuf::from("/tmp/scorecard-from-cli")))
        .resolve();

    env::remove_var(ROOT_FOLDER_ENV);
    assert_eq!(root, PathBuf::from("/tmp/scorecard-from-cli"));
}

#[test]
#[serial]
fn test_environment_variable_beats_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    std::fs::write(&config_path, "root_folder = \"/tmp/scorecard-from-toml\"\n").unwrap();

    env::set_var(ROOT_FOLDER_ENV, "/tmp/scorecard-from-env");
    let root = RootFolderResolver::new("test")
        .with_config_file(&config_path)
        .resolve();
    env::remove_var(ROOT_FOLDER_ENV);

    assert_eq!(root, PathBuf::from("/tmp/scorecard-from-env"));
}

#[test]
#[serial]
fn test_config_file_used_without_overrides() {
    env::remove_var(ROOT_FOLDER_ENV);

    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        "root_folder = \"/tmp/scorecard-from-toml\"\nlog_level = \"debug\"\nunrelated = 1\n",
    )
    .unwrap();

    let root = RootFolderResolver::new("test")
        .with_config_file(&config_path)
        .resolve();

    assert_eq!(root, PathBuf::from("/tmp/scorecard-from-toml"));
}

#[test]
#[serial]
fn test_broken_config_file_falls_back_to_default() {
    env::remove_var(ROOT_FOLDER_ENV);

    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    std::fs::write(&config_path, "root_folder = [not valid").unwrap();

    let root = RootFolderResolver::new("test")
        .with_config_file(&config_path)
        .resolve();

    assert!(!root.as_os_str().is_empty());
    assert_ne!(root, PathBuf::from("[not valid"));
}

#[test]
fn test_toml_config_parse_error_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    std::fs::write(&config_path, "root_folder = ").unwrap();

    assert!(TomlConfig::load(&config_path).is_err());
}

#[test]
fn test_initializer_creates_directory_and_database_path() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("a").join("b");

    let initializer = RootFolderInitializer::new(root.clone());
    initializer.ensure_directory_exists().unwrap();

    assert!(root.is_dir());
    assert_eq!(initializer.database_path(), root.join(DATABASE_FILE_NAME));
}
