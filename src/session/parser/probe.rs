//! Bounded head/tail presence check for raw streaming files.
//!
//! Streaming logs grow for as long as a session runs and can reach
//! gigabytes, so the fast path only reads a small window from each end and
//! pulls the first and last `HostUnixTime` tokens out with a textual scan.
//! The scan tolerates a file that is still being written (unterminated
//! array). When the tail window holds no timestamp the whole file is parsed
//! as JSON instead; that fallback can fail on malformed input and the error
//! is returned for the caller to contain.

use log::{debug, trace};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;

static HOST_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""HostUnixTime"\s*:\s*(\d+)"#).expect("valid host time pattern"));

static DEVICE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""DeviceId"\s*:\s*"([^"]*)""#).expect("valid device id pattern"));

const HOST_TIME_KEY: &str = "HostUnixTime";

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("full parse of {path} failed: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Window sizes for the fast path
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProbeOptions {
    pub head_window: usize,
    /// Heads shorter than this hold nothing but the JSON skeleton
    pub min_content: usize,
    pub tail_window: usize,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            head_window: 500,
            min_content: 200,
            tail_window: 10_000,
        }
    }
}

/// How a probe reached its answer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ProbeMethod {
    Missing,
    TooSmall,
    FastPath,
    FullParse,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreamProbe {
    pub present: bool,
    pub device_id: Option<String>,
    pub start_ms: Option<i64>,
    pub end_ms: Option<i64>,
    pub duration_ms: i64,
    pub method: ProbeMethod,
}

impl StreamProbe {
    fn absent(method: ProbeMethod) -> Self {
        Self {
            present: false,
            device_id: None,
            start_ms: None,
            end_ms: None,
            duration_ms: 0,
            method,
        }
    }

    fn from_span(
        device_id: Option<String>,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
        method: ProbeMethod,
    ) -> Self {
        let duration_ms = match (start_ms, end_ms) {
            (Some(start), Some(end)) => (end - start).max(0),
            _ => 0,
        };
        Self {
            present: duration_ms > 0,
            device_id,
            start_ms,
            end_ms,
            duration_ms,
            method,
        }
    }
}

/// Check whether a streaming file holds any time-stamped data
pub fn probe(path: &Path, options: &ProbeOptions) -> Result<StreamProbe, ProbeError> {
    if !path.exists() {
        trace!("Stream file not found: {:?}", path);
        return Ok(StreamProbe::absent(ProbeMethod::Missing));
    }

    let io_err = |source: std::io::Error| ProbeError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(io_err)?;
    let mut head = Vec::with_capacity(options.head_window);
    (&mut file)
        .take(options.head_window as u64)
        .read_to_end(&mut head)
        .map_err(io_err)?;

    if head.len() < options.min_content {
        debug!(
            "Stream file {:?} has only {} bytes in its head window, treating as empty",
            path,
            head.len()
        );
        return Ok(StreamProbe::absent(ProbeMethod::TooSmall));
    }

    let head_text = String::from_utf8_lossy(&head);
    let device_id = DEVICE_ID
        .captures(&head_text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());
    let head_start = first_host_time(&head_text);

    let file_len = file.metadata().map_err(io_err)?.len();
    let tail_offset = file_len.saturating_sub(options.tail_window as u64);
    file.seek(SeekFrom::Start(tail_offset)).map_err(io_err)?;
    let mut tail = Vec::with_capacity(options.tail_window);
    file.read_to_end(&mut tail).map_err(io_err)?;
    let tail_end = last_host_time(&String::from_utf8_lossy(&tail));

    if let (Some(start), Some(end)) = (head_start, tail_end) {
        return Ok(StreamProbe::from_span(
            device_id,
            Some(start),
            Some(end),
            ProbeMethod::FastPath,
        ));
    }

    debug!(
        "Fast path found no timestamps in {:?} (head={:?}, tail={:?}), parsing whole file",
        path, head_start, tail_end
    );
    let (first, last) = full_parse_span(path)?;
    Ok(StreamProbe::from_span(
        device_id,
        head_start.or(first),
        last,
        ProbeMethod::FullParse,
    ))
}

fn first_host_time(text: &str) -> Option<i64> {
    HOST_TIME
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn last_host_time(text: &str) -> Option<i64> {
    HOST_TIME
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| m.as_str().parse().ok())
        .last()
}

/// First and last record timestamps from a full structured parse
fn full_parse_span(path: &Path) -> Result<(Option<i64>, Option<i64>), ProbeError> {
    let bytes = std::fs::read(path).map_err(|source| ProbeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_slice(&bytes).map_err(|e| ProbeError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let records = top_level_records(&value);
    let first = records.iter().find_map(|record| find_host_time(record));
    let last = records.iter().rev().find_map(|record| find_host_time(record));
    Ok((first, last))
}

/// Records of a streaming file: the top-level array, or the first array
/// field of a wrapping object, or the object itself.
fn top_level_records(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => map
            .values()
            .find_map(|v| v.as_array().filter(|items| !items.is_empty()))
            .map(|items| items.iter().collect())
            .unwrap_or_else(|| vec![value]),
        _ => Vec::new(),
    }
}

fn find_host_time(value: &Value) -> Option<i64> {
    match value {
        Value::Object(map) => map
            .get(HOST_TIME_KEY)
            .and_then(Value::as_i64)
            .or_else(|| map.values().find_map(find_host_time)),
        Value::Array(items) => items.iter().find_map(find_host_time),
        _ => None,
    }
}
