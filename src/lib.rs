pub mod batch;
pub mod config;
pub mod db;
pub mod logging;
pub mod readers;
pub mod reference;
pub mod session;

#[cfg(test)]
mod tests;

pub use batch::{discover_sessions, run_batch, BatchReport};
pub use config::{load_config, ReconcilerConfig};
pub use db::MetadataDatabase;
pub use reference::ReferenceTable;
pub use session::{extract_session_metadata, SessionMetadataRecord};
