use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Placeholder written into text fields whose source was unavailable
pub const NA: &str = "NA";

/// Application used to acquire the session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RecordingApplication {
    StreamingApp,
    ResearchApp,
}

/// Hemisphere(s) covered by the implanted leads
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PatientSide {
    Left,
    Right,
    Both,
}

impl PatientSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatientSide::Left => "L",
            PatientSide::Right => "R",
            PatientSide::Both => "LR",
        }
    }
}

/// One row of a normalized settings-change table.
///
/// `start`/`stop` are `None` (not-a-time) when the raw endpoint was missing
/// or could not be converted; `duration_ms` is `0` whenever either endpoint
/// is missing or the interval came out negative.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimedRow<T> {
    pub start: Option<DateTime<FixedOffset>>,
    pub stop: Option<DateTime<FixedOffset>>,
    pub duration_ms: i64,
    pub settings: T,
}

/// One event-log entry with its zoned timestamp
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventRow {
    pub time: Option<DateTime<FixedOffset>>,
    pub event_type: String,
    pub event_sub_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimeDomainSettings {
    /// One descriptor per channel, `"disabled"` for unused channels
    pub channels: Vec<String>,
    pub sample_rate_hz: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PowerSettings {
    /// `"<channel>:<lo>-<hi>Hz"` per configured band
    pub bands: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FftSettings {
    pub size: Option<u32>,
    pub interval_ms: Option<u32>,
    pub window_load: Option<String>,
}

/// Stimulation configuration as logged in the device settings file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StimSettings {
    pub active_group: Option<String>,
    pub therapy_on: Option<bool>,
    /// `"Group A: E0-E3+C,2.5mA,60us,130.2Hz"` per configured program
    pub programs: Vec<String>,
}

/// One stimulation-log entry
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StimLogEntry {
    pub active_group: Option<String>,
    pub therapy_on: Option<bool>,
    /// Free-text program descriptors, index 0 is program 1
    pub programs: Vec<Option<String>>,
}

/// Linear discriminant detector configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct LinearDiscriminant {
    pub bias_term: Vec<f64>,
    pub weight_vector: Vec<f64>,
    pub update_rate: Option<u32>,
    pub onset_duration: Option<u32>,
    pub termination_duration: Option<u32>,
    pub blanking_duration_upon_state_change: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetectorSettings {
    pub ld0: Option<LinearDiscriminant>,
    pub ld1: Option<LinearDiscriminant>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdaptiveState {
    pub is_valid: bool,
    /// Program-0 target current, `-1` when the state is not configured
    pub amp_milliamps: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdaptiveSettings {
    pub adaptive_mode: Option<String>,
    pub current_state: Option<u8>,
    pub states: Vec<AdaptiveState>,
}

/// Log sources the reconciler consults for one session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    DeviceSettings,
    StimLog,
    EventLog,
    ReferenceTable,
    AdaptiveStream,
    TimeDomainStream,
    PowerStream,
    FftStream,
    AccelerometryStream,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::DeviceSettings => "device settings",
            SourceKind::StimLog => "stim log",
            SourceKind::EventLog => "event log",
            SourceKind::ReferenceTable => "reference table",
            SourceKind::AdaptiveStream => "adaptive stream",
            SourceKind::TimeDomainStream => "time-domain stream",
            SourceKind::PowerStream => "power stream",
            SourceKind::FftStream => "FFT stream",
            SourceKind::AccelerometryStream => "accelerometry stream",
        };
        f.write_str(name)
    }
}

/// What happened when one source was consulted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", content = "detail", rename_all = "camelCase")]
pub enum SourceStatus {
    Loaded,
    Missing,
    Failed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceOutcome {
    pub source: SourceKind,
    pub status: SourceStatus,
}

/// One row of the metadata database, one per recording session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadataRecord {
    // identity
    pub session_id: String,
    pub device_settings_path: String,
    pub recording_application: RecordingApplication,

    // patient context
    pub patient_id: String,
    pub patient_side: Option<PatientSide>,
    pub target_areas: Vec<String>,
    pub diagnosis: String,
    pub patient_gender: String,

    // timing
    pub session_start: Option<DateTime<FixedOffset>>,
    pub session_end: Option<DateTime<FixedOffset>>,
    pub duration_ms: i64,

    // channel snapshot
    pub chan1: String,
    pub chan2: String,
    pub chan3: String,
    pub chan4: String,

    // stimulation snapshot
    pub stimulation_on: Option<bool>,
    pub active_group: String,
    pub electrode_config: String,
    pub amplitude_milliamps: Option<f64>,
    pub rate_hz: Option<f64>,
    pub full_stim_settings_text: String,
    pub num_stim_settings_changes: usize,

    // adaptive snapshot
    pub embedded_mode: String,
    pub target_adaptive_currents: Vec<f64>,

    // stream presence
    pub detection_streaming: Option<bool>,
    pub time_domain_streaming: Option<bool>,
    pub power_streaming: Option<bool>,
    pub fft_streaming: Option<bool>,
    pub accelerometry_streaming: Option<bool>,

    // nested tables
    pub time_domain_settings: Vec<TimedRow<TimeDomainSettings>>,
    pub power_settings: Vec<TimedRow<PowerSettings>>,
    pub fft_settings: Vec<TimedRow<FftSettings>>,
    pub stim_settings: Vec<TimedRow<StimSettings>>,
    pub stim_log: Vec<TimedRow<StimLogEntry>>,
    pub detector_settings: Vec<TimedRow<DetectorSettings>>,
    pub adaptive_settings: Vec<TimedRow<AdaptiveSettings>>,
    pub event_log: Vec<EventRow>,

    pub source_status: Vec<SourceOutcome>,
}

impl SessionMetadataRecord {
    /// Record with identity set and every other field at its sentinel
    pub fn new(
        session_id: String,
        device_settings_path: String,
        recording_application: RecordingApplication,
    ) -> Self {
        Self {
            session_id,
            device_settings_path,
            recording_application,
            patient_id: NA.to_string(),
            patient_side: None,
            target_areas: Vec::new(),
            diagnosis: NA.to_string(),
            patient_gender: NA.to_string(),
            session_start: None,
            session_end: None,
            duration_ms: 0,
            chan1: NA.to_string(),
            chan2: NA.to_string(),
            chan3: NA.to_string(),
            chan4: NA.to_string(),
            stimulation_on: None,
            active_group: NA.to_string(),
            electrode_config: NA.to_string(),
            amplitude_milliamps: None,
            rate_hz: None,
            full_stim_settings_text: NA.to_string(),
            num_stim_settings_changes: 0,
            embedded_mode: NA.to_string(),
            target_adaptive_currents: Vec::new(),
            detection_streaming: None,
            time_domain_streaming: None,
            power_streaming: None,
            fft_streaming: None,
            accelerometry_streaming: None,
            time_domain_settings: Vec::new(),
            power_settings: Vec::new(),
            fft_settings: Vec::new(),
            stim_settings: Vec::new(),
            stim_log: Vec::new(),
            detector_settings: Vec::new(),
            adaptive_settings: Vec::new(),
            event_log: Vec::new(),
            source_status: Vec::new(),
        }
    }

    /// Space-joined anatomical targets, `"NA"` when none are known
    pub fn area(&self) -> String {
        if self.target_areas.is_empty() {
            NA.to_string()
        } else {
            self.target_areas.join(" ")
        }
    }

    pub fn status_of(&self, source: SourceKind) -> Option<&SourceStatus> {
        self.source_status
            .iter()
            .find(|outcome| outcome.source == source)
            .map(|outcome| &outcome.status)
    }

    pub(crate) fn record_outcome(&mut self, source: SourceKind, status: SourceStatus) {
        self.source_status.push(SourceOutcome { source, status });
    }
}

/// Distinct target currents in ascending order
pub(crate) fn distinct_currents(values: impl IntoIterator<Item = f64>) -> Vec<f64> {
    // f64 is not Ord; milliamp targets are keyed at microamp resolution
    let keys: BTreeSet<i64> = values
        .into_iter()
        .map(|v| (v * 1000.0).round() as i64)
        .collect();
    keys.into_iter().map(|k| k as f64 / 1000.0).collect()
}
