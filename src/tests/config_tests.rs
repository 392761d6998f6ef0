use std::path::PathBuf;
use tempfile::TempDir;

use crate::config::{load_config, ConfigError, ReconcilerConfig};
use crate::session::parser::session_id::DEFAULT_STREAMING_MARKER;

use super::test_helpers::write_file;

#[test]
fn test_missing_config_gives_defaults() {
    let dir = TempDir::new().unwrap();
    let config = load_config(&dir.path().join("config.json")).unwrap();

    assert_eq!(config, ReconcilerConfig::default());
    assert_eq!(config.workers, 4);
    assert_eq!(config.session_timeout_secs, 300);
    assert_eq!(config.min_session_age_hours, 0.0);
    assert_eq!(config.streaming_app_marker, DEFAULT_STREAMING_MARKER);
    assert_eq!(config.probe.min_content, 200);
}

#[test]
fn test_partial_config_keeps_other_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_file(
        dir.path(),
        "config.json",
        r#"{"dataRoot": "/data/rcs", "workers": 8, "probe": {"tailWindow": 2048}}"#,
    );

    let config = load_config(&path).unwrap();

    assert_eq!(config.data_root, PathBuf::from("/data/rcs"));
    assert_eq!(config.workers, 8);
    assert_eq!(config.probe.tail_window, 2048);
    assert_eq!(config.probe.head_window, 500);
    assert_eq!(config.session_timeout_secs, 300);
}

#[test]
fn test_zero_workers_runs_one() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "config.json", r#"{"workers": 0}"#);

    assert_eq!(load_config(&path).unwrap().workers, 1);
}

#[test]
fn test_malformed_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "config.json", "{workers: four}");

    assert!(matches!(load_config(&path), Err(ConfigError::Parse { .. })));
}

#[test]
fn test_extraction_options_follow_config() {
    let config = ReconcilerConfig {
        streaming_app_marker: "CustomStreamer".to_string(),
        ..ReconcilerConfig::default()
    };

    let options = config.extraction_options();

    assert_eq!(options.streaming_marker, "CustomStreamer");
    assert_eq!(options.probe, config.probe);
}
