//! Tests for config file lookup, data folder priority and graceful degradation
//!
//! Uses serial_test because several tests manipulate process environment.

use civic_common::config::{load_toml_or_default, ConfigResolver, LoggingConfig};
use serde::Deserialize;
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
struct SampleConfig {
    port: u16,
    logging: LoggingConfig,
}

#[test]
#[serial]
fn test_data_folder_cli_has_priority() {
    env::set_var("CIVIC_TEST_DATA", "/tmp/from-env");
    let resolver = ConfigResolver::new("civic-test");

    let folder = resolver.data_folder(
        Some(Path::new("/tmp/from-cli")),
        "CIVIC_TEST_DATA",
        Some(Path::new("/tmp/from-toml")),
    );
    assert_eq!(folder, PathBuf::from("/tmp/from-cli"));

    env::remove_var("CIVIC_TEST_DATA");
}

#[test]
#[serial]
fn test_data_folder_env_beats_toml() {
    env::set_var("CIVIC_TEST_DATA", "/tmp/from-env");
    let resolver = ConfigResolver::new("civic-test");

    let folder = resolver.data_folder(None, "CIVIC_TEST_DATA", Some(Path::new("/tmp/from-toml")));
    assert_eq!(folder, PathBuf::from("/tmp/from-env"));

    env::remove_var("CIVIC_TEST_DATA");
}

#[test]
#[serial]
fn test_data_folder_falls_back_to_toml_then_default() {
    env::remove_var("CIVIC_TEST_DATA");
    let resolver = ConfigResolver::new("civic-test");

    let folder = resolver.data_folder(None, "CIVIC_TEST_DATA", Some(Path::new("/tmp/from-toml")));
    assert_eq!(folder, PathBuf::from("/tmp/from-toml"));

    let folder = resolver.data_folder(None, "CIVIC_TEST_DATA", None);
    assert_eq!(folder, resolver.default_data_folder());
    assert!(folder.to_string_lossy().contains("civic"));
}

#[test]
#[serial]
fn test_config_file_explicit_env_path() {
    env::set_var("CIVIC_TEST_CONFIG", "/tmp/civic-explicit.toml");
    let resolver = ConfigResolver::new("civic-test");

    let path = resolver.config_file(None, "CIVIC_TEST_CONFIG");
    assert_eq!(path, Some(PathBuf::from("/tmp/civic-explicit.toml")));

    env::remove_var("CIVIC_TEST_CONFIG");
}

#[test]
fn test_missing_config_file_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("absent.toml");

    let config: SampleConfig = load_toml_or_default(Some(&missing)).unwrap();
    assert_eq!(config, SampleConfig::default());

    let config: SampleConfig = load_toml_or_default(None).unwrap();
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_config_file_is_parsed() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "port = 6060\n[logging]\nlevel = \"debug\"\n").unwrap();

    let config: SampleConfig = load_toml_or_default(Some(&path)).unwrap();
    assert_eq!(config.port, 6060);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_malformed_config_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "port = \"not a number\"").unwrap();

    let result: civic_common::Result<SampleConfig> = load_toml_or_default(Some(&path));
    let err = result.unwrap_err();
    assert!(err.to_string().contains("Configuration error"));
}
