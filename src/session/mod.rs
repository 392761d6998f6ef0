mod model;
pub mod parser;

pub use model::{
    AdaptiveSettings, AdaptiveState, DetectorSettings, EventRow, FftSettings, LinearDiscriminant,
    PatientSide, PowerSettings, RecordingApplication, SessionMetadataRecord, SourceKind,
    SourceOutcome, SourceStatus, StimLogEntry, StimSettings, TimeDomainSettings, TimedRow, NA,
};
pub use parser::{
    classify_acquisition_app, extract_session_id, extract_session_metadata, probe,
    to_zoned_time, ExtractionOptions, ProbeOptions, ReconcileError, StreamProbe,
};
