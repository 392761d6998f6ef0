//! Readers for the per-session JSON logs.
//!
//! Each log type has its own reader implementing [`LogReader`]. A reader
//! turns raw file bytes into typed records (validated here, at the reader
//! boundary) and folds them into a per-log table.
//!
//! # Submodules
//!
//! - `repair`: closing off files truncated mid-write
//! - `types`: serde records for every log type
//! - `device_settings`: sensing, stimulation, detector and adaptive settings
//! - `stim_log`: therapy changes logged during the session
//! - `event_log`: patient and device events

mod device_settings;
mod event_log;
mod repair;
mod stim_log;
pub mod types;

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::session::SourceKind;

pub use device_settings::{DeviceSettingsLog, DeviceSettingsReader, LeadInfo, SubjectMeta};
pub use event_log::{EventLogReader, RawEvent};
pub use repair::repair_json;
pub use stim_log::{program_descriptor, StimLog, StimLogReader};

pub const DEVICE_SETTINGS_FILE: &str = "DeviceSettings.json";
pub const STIM_LOG_FILE: &str = "StimLog.json";
pub const EVENT_LOG_FILE: &str = "EventLog.json";

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is empty")]
    Empty { path: PathBuf },

    #[error("invalid JSON in {path}: {message}")]
    Json { path: PathBuf, message: String },

    #[error("record {index} of {path} does not match the expected layout: {message}")]
    Schema {
        path: PathBuf,
        index: usize,
        message: String,
    },
}

/// A reader for one log type
pub trait LogReader {
    /// Typed shape of one record in the file
    type Record: DeserializeOwned;

    /// Table built from all records
    type Output;

    fn source(&self) -> SourceKind;

    fn file_name(&self) -> &'static str;

    fn build(&self, records: Vec<Self::Record>) -> Self::Output;

    /// Parse already-loaded bytes; `path` is only used in errors
    fn parse(&self, path: &Path, bytes: &[u8]) -> Result<Self::Output, ReaderError> {
        let records = decode_records::<Self::Record>(path, bytes)?;
        Ok(self.build(records))
    }

    /// Read this log from `dir`; `Ok(None)` when the file is absent
    fn read(&self, dir: &Path) -> Result<Option<Self::Output>, ReaderError> {
        let path = dir.join(self.file_name());
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).map_err(|source| ReaderError::Io {
            path: path.clone(),
            source,
        })?;
        self.parse(&path, &bytes).map(Some)
    }
}

/// Decode a file holding either an array of records or a single record
pub fn decode_records<T: DeserializeOwned>(path: &Path, bytes: &[u8]) -> Result<Vec<T>, ReaderError> {
    let repaired = repair_json(bytes);
    if repaired.is_empty() {
        return Err(ReaderError::Empty {
            path: path.to_path_buf(),
        });
    }

    let value: Value = serde_json::from_slice(&repaired).map_err(|e| ReaderError::Json {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(_) => vec![value],
        other => {
            return Err(ReaderError::Schema {
                path: path.to_path_buf(),
                index: 0,
                message: format!("expected an array or object, found {}", json_kind(&other)),
            })
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value(item).map_err(|e| ReaderError::Schema {
                path: path.to_path_buf(),
                index,
                message: e.to_string(),
            })
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
