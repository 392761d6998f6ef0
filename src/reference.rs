//! Read-only device-ID to patient lookup table.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("failed to read reference table {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse reference table {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("device {device_id} matches {count} reference entries")]
    AmbiguousMatch { device_id: String, count: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceEntry {
    pub device_id: String,
    pub patient_id: String,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    entries: Vec<ReferenceEntry>,
}

impl ReferenceTable {
    pub fn new(entries: Vec<ReferenceEntry>) -> Self {
        Self { entries }
    }

    /// Load a JSON array of entries
    pub fn load(path: &Path) -> Result<Self, ReferenceError> {
        let content = fs::read_to_string(path).map_err(|source| ReferenceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let entries: Vec<ReferenceEntry> =
            serde_json::from_str(&content).map_err(|e| ReferenceError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        log::info!("Loaded {} reference entries from {:?}", entries.len(), path);
        Ok(Self { entries })
    }

    /// Exact-match lookup. More than one hit is an error, never a guess.
    pub fn lookup(&self, device_id: &str) -> Result<Option<&ReferenceEntry>, ReferenceError> {
        let matches: Vec<&ReferenceEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.device_id == device_id)
            .collect();
        match matches.as_slice() {
            [] => Ok(None),
            [entry] => Ok(Some(entry)),
            _ => Err(ReferenceError::AmbiguousMatch {
                device_id: device_id.to_string(),
                count: matches.len(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
