//! Session identity derived from folder and file names.

use chrono::{DateTime, Duration, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use thiserror::Error;

use crate::session::model::RecordingApplication;

/// Length of a `Session<epoch-ms>` token, e.g. "Session1608052648432"
pub const SESSION_ID_LEN: usize = 20;

/// Folder name of the continuous streaming acquisition app
pub const DEFAULT_STREAMING_MARKER: &str = "SummitContinuousBilateralStreaming";

const SESSION_MARKER: &str = "session";

static SESSION_DIR_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[Ss]ession(\d+)$").expect("valid session folder pattern"));

#[derive(Error, Debug, PartialEq)]
pub enum SessionIdError {
    #[error("no 'session' marker in path: {path}")]
    MissingMarker { path: String },

    #[error("session token truncated in path: {path}")]
    Truncated { path: String },
}

/// Return the 20-character token starting at the first case-insensitive
/// occurrence of "session" in `path`.
pub fn extract_session_id(path: &Path) -> Result<String, SessionIdError> {
    let text = path.to_string_lossy();
    // ASCII lowercasing keeps byte offsets aligned with `text`
    let lowered = text.to_ascii_lowercase();
    let start = lowered
        .find(SESSION_MARKER)
        .ok_or_else(|| SessionIdError::MissingMarker {
            path: text.to_string(),
        })?;

    text.get(start..start + SESSION_ID_LEN)
        .map(str::to_string)
        .ok_or_else(|| SessionIdError::Truncated {
            path: text.to_string(),
        })
}

/// Streaming app sessions live under a folder carrying `marker` in its name
pub fn classify_acquisition_app(path: &Path, marker: &str) -> RecordingApplication {
    if path.to_string_lossy().contains(marker) {
        RecordingApplication::StreamingApp
    } else {
        RecordingApplication::ResearchApp
    }
}

/// True for folder names like `Session1608052648432` or `session1608052648432`
pub fn is_session_dir_name(name: &str) -> bool {
    SESSION_DIR_NAME.is_match(name)
}

/// Session start encoded in the folder name, if it parses
pub fn session_start_from_name(name: &str) -> Option<DateTime<Utc>> {
    let caps = SESSION_DIR_NAME.captures(name)?;
    let millis: i64 = caps.get(1)?.as_str().parse().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}

/// Age of a session folder relative to `now`.
///
/// Unparseable names are treated as old enough for anything, so they are
/// never held back by an age filter.
pub fn session_age(name: &str, now: DateTime<Utc>) -> Duration {
    match session_start_from_name(name) {
        Some(started) => now.signed_duration_since(started),
        None => {
            log::warn!("Could not parse timestamp from session folder: {}", name);
            Duration::MAX
        }
    }
}
