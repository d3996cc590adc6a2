//! Integration tests for configuration loader
//!
//! Tests the end-to-end behavior of loading configuration from files.

use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;
use tiercache_domain::CacheError;
use tiercache_infra::config;

#[test]
fn test_load_config_from_json_file() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("tiercache.json");
    std::fs::write(
        &path,
        r#"{
            "cache": { "max_memory_items": 250, "default_ttl": 3600000, "cache_version": 3 },
            "fetch": { "retry_attempts": 4, "offline_fallback": false },
            "storage": { "path": "/tmp/integration_test.db", "pool_size": 8 }
        }"#,
    )
    .expect("Failed to write config");

    let config = config::load_from_file(Some(path)).expect("Failed to load config from JSON file");
    assert_eq!(config.cache.max_memory_items, 250);
    assert_eq!(config.cache.default_ttl, Duration::from_secs(3600));
    assert_eq!(config.cache.cache_version, 3);
    assert_eq!(config.fetch.retry_attempts, 4);
    assert!(!config.fetch.offline_fallback);
    assert_eq!(config.storage.path, PathBuf::from("/tmp/integration_test.db"));
    assert_eq!(config.storage.pool_size, 8);
}

#[test]
fn test_load_config_from_toml_file_with_unit_durations() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("tiercache.toml");
    std::fs::write(
        &path,
        r#"
[cache]
default_ttl = "1h"
sweep_interval = "10m"

[fetch]
timeout = "5s"
background_ttl = "1d"
"#,
    )
    .expect("Failed to write config");

    let config = config::load_from_file(Some(path)).expect("Failed to load config from TOML file");
    assert_eq!(config.cache.default_ttl, Duration::from_secs(3600));
    assert_eq!(config.cache.sweep_interval, Duration::from_secs(600));
    assert_eq!(config.fetch.timeout, Duration::from_secs(5));
    assert_eq!(config.fetch.background_ttl, Duration::from_secs(86_400));
}

#[test]
fn test_invalid_values_fail_validation() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("tiercache.toml");
    std::fs::write(&path, "[fetch]\nretry_delay = 5000\nmax_retry_delay = 1000\n")
        .expect("Failed to write config");

    let result = config::load_from_file(Some(path));
    assert!(matches!(result, Err(CacheError::Config(_))), "Expected validation failure");
}

#[test]
fn test_bad_duration_unit_is_a_config_error() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("tiercache.toml");
    std::fs::write(&path, "[cache]\ndefault_ttl = \"3 weeks\"\n").expect("Failed to write config");

    let result = config::load_from_file(Some(path));
    assert!(matches!(result, Err(CacheError::Config(_))));
}
