//! Run configuration.
//!
//! Paths and tunables live in one explicit object that the batch driver
//! hands to the core; nothing in the crate reads hard-coded storage paths.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::session::parser::session_id::DEFAULT_STREAMING_MARKER;
use crate::session::{ExtractionOptions, ProbeOptions};

const APP_DIR: &str = "rcs-session-metadata";
const CONFIG_ENV: &str = "RCS_METADATA_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {message}")]
    Read { path: String, message: String },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconcilerConfig {
    /// Root scanned for `Session*` folders
    pub data_root: PathBuf,
    pub database_path: PathBuf,
    pub reference_table_path: Option<PathBuf>,
    pub streaming_app_marker: String,
    pub workers: usize,
    pub session_timeout_secs: u64,
    /// Sessions younger than this are skipped; 0 disables the filter
    pub min_session_age_hours: f64,
    pub log_dir: Option<PathBuf>,
    pub probe: ProbeOptions,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);
        Self {
            data_root: PathBuf::from("."),
            database_path: data_dir.join("session_metadata.db"),
            reference_table_path: None,
            streaming_app_marker: DEFAULT_STREAMING_MARKER.to_string(),
            workers: 4,
            session_timeout_secs: 300,
            min_session_age_hours: 0.0,
            log_dir: None,
            probe: ProbeOptions::default(),
        }
    }
}

impl ReconcilerConfig {
    pub fn extraction_options(&self) -> ExtractionOptions {
        ExtractionOptions {
            streaming_marker: self.streaming_app_marker.clone(),
            probe: self.probe,
        }
    }
}

/// Config path: `$RCS_METADATA_CONFIG`, else the platform config dir
pub fn get_config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("config.json")
}

/// Load the config at `path`; a missing file gives the defaults
pub fn load_config(path: &Path) -> Result<ReconcilerConfig, ConfigError> {
    if !path.exists() {
        log::debug!("No config at {:?}, using defaults", path);
        return Ok(ReconcilerConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let config: ReconcilerConfig =
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    if config.workers == 0 {
        log::warn!("Config sets workers = 0, running with 1 worker");
        return Ok(ReconcilerConfig {
            workers: 1,
            ..config
        });
    }
    Ok(config)
}
