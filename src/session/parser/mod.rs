//! Session metadata extraction.
//!
//! # Submodules
//!
//! - `session_id`: session identity and acquisition app from folder names
//! - `time`: epoch-millisecond to zoned timestamp conversion
//! - `probe`: bounded head/tail presence check for raw streaming files
//! - `snapshot`: summary fields derived from the latest settings rows
//! - `reconcile`: per-session orchestration and failure isolation

pub mod probe;
pub mod reconcile;
pub mod session_id;
pub mod snapshot;
pub mod time;

// Re-export public API
pub use probe::{probe, ProbeError, ProbeMethod, ProbeOptions, StreamProbe};
pub use reconcile::{
    extract_session_metadata, resolve_device_dir, ExtractionOptions, ReconcileError, STREAM_FILES,
};
pub use session_id::{
    classify_acquisition_app, extract_session_id, is_session_dir_name, session_age,
    SessionIdError,
};
pub use time::{normalize_interval, to_zoned_time, TimeError};
