//! Session metadata reconciliation - one record per session folder.
//!
//! Identity is the only hard requirement. Every other source (device
//! settings, stim log, event log, each raw stream, the reference table) is
//! consulted inside its own failure boundary: a missing or malformed file
//! leaves its fields at their sentinels, is logged, and is recorded in
//! `source_status`, while the remaining sources still run.

use log::{debug, info, trace, warn};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::readers::{
    DeviceSettingsLog, DeviceSettingsReader, EventLogReader, LogReader, ReaderError,
    StimLogReader, DEVICE_SETTINGS_FILE,
};
use crate::reference::{ReferenceError, ReferenceTable};
use crate::session::model::{
    EventRow, SessionMetadataRecord, SourceKind, SourceStatus, NA,
};

use super::probe::{probe, ProbeMethod, ProbeOptions, StreamProbe};
use super::session_id::{
    classify_acquisition_app, extract_session_id, SessionIdError, DEFAULT_STREAMING_MARKER,
};
use super::snapshot::{
    channel_snapshot, normalize_patient_id, parse_side, patient_side, stim_snapshot,
    target_adaptive_currents, target_areas,
};
use super::time::{interval_duration_ms, normalize_interval, to_zoned_time};

pub const ADAPTIVE_STREAM_FILE: &str = "AdaptiveLog.json";
pub const TIME_DOMAIN_STREAM_FILE: &str = "RawDataTD.json";
pub const POWER_STREAM_FILE: &str = "RawDataPower.json";
pub const FFT_STREAM_FILE: &str = "RawDataFFT.json";
pub const ACCEL_STREAM_FILE: &str = "RawDataAccel.json";

/// Raw streaming files and the source each one feeds
pub const STREAM_FILES: [(SourceKind, &str); 5] = [
    (SourceKind::AdaptiveStream, ADAPTIVE_STREAM_FILE),
    (SourceKind::TimeDomainStream, TIME_DOMAIN_STREAM_FILE),
    (SourceKind::PowerStream, POWER_STREAM_FILE),
    (SourceKind::FftStream, FFT_STREAM_FILE),
    (SourceKind::AccelerometryStream, ACCEL_STREAM_FILE),
];

const DEVICE_DIR_PREFIX: &str = "device";

/// Errors that abort extraction for one session
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("cannot resolve session identity: {0}")]
    SessionId(#[from] SessionIdError),

    #[error("reference lookup failed for session {session_id}: {source}")]
    Reference {
        session_id: String,
        #[source]
        source: ReferenceError,
    },
}

/// Per-run settings the reconciler needs; no global state is consulted
#[derive(Debug, Clone)]
pub struct ExtractionOptions {
    pub streaming_marker: String,
    pub probe: ProbeOptions,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            streaming_marker: DEFAULT_STREAMING_MARKER.to_string(),
            probe: ProbeOptions::default(),
        }
    }
}

/// Build the metadata record for one session folder.
///
/// `session_dir` may be the session folder, its `Device*` subfolder, or the
/// DeviceSettings.json file itself.
pub fn extract_session_metadata(
    session_dir: &Path,
    options: &ExtractionOptions,
    reference: Option<&ReferenceTable>,
) -> Result<SessionMetadataRecord, ReconcileError> {
    let session_id = extract_session_id(session_dir)?;
    let device_dir = resolve_device_dir(session_dir);
    let device_settings_path = device_dir.join(DEVICE_SETTINGS_FILE);
    debug!(
        "[{}] Extracting metadata from {:?}",
        session_id, device_dir
    );

    let mut record = SessionMetadataRecord::new(
        session_id,
        device_settings_path.to_string_lossy().to_string(),
        classify_acquisition_app(session_dir, &options.streaming_marker),
    );

    let device_settings = read_source(&mut record, &DeviceSettingsReader, &device_dir);
    let utc_offset_hours = device_settings
        .as_ref()
        .and_then(|log| log.meta.utc_offset_hours)
        .unwrap_or_else(|| {
            debug!("[{}] No recorded UTC offset, using UTC", record.session_id);
            0.0
        });

    if let Some(log) = &device_settings {
        apply_device_settings(&mut record, log, utc_offset_hours);
    }

    if let Some(stim_log) = read_source(&mut record, &StimLogReader, &device_dir) {
        record.stim_log = normalize_interval(stim_log.rows, utc_offset_hours);
        if let Some(snapshot) = stim_snapshot(&record.stim_log) {
            record.stimulation_on = snapshot.stimulation_on;
            record.active_group = snapshot.active_group;
            record.electrode_config = snapshot
                .program
                .electrode_config
                .unwrap_or_else(|| NA.to_string());
            record.amplitude_milliamps = snapshot.program.amplitude_milliamps;
            record.rate_hz = snapshot.program.rate_hz;
            record.full_stim_settings_text = snapshot.full_settings_text;
            record.num_stim_settings_changes = snapshot.num_changes;
        }
    }

    if let Some(events) = read_source(&mut record, &EventLogReader, &device_dir) {
        record.event_log = events
            .into_iter()
            .map(|event| EventRow {
                time: event
                    .host_unix_time
                    .and_then(|ms| to_zoned_time(ms, utc_offset_hours).ok()),
                event_type: event.event_type,
                event_sub_type: event.event_sub_type,
            })
            .collect();
    }

    let mut probed_device_id = None;
    for (source, file_name) in STREAM_FILES {
        let path = device_dir.join(file_name);
        let Some(result) = probe_source(&mut record, source, &path, &options.probe) else {
            continue;
        };
        if probed_device_id.is_none() {
            probed_device_id = result.device_id.clone();
        }
        apply_probe(&mut record, source, &result, utc_offset_hours);
    }

    if let Some(table) = reference {
        let device_id = device_settings
            .as_ref()
            .and_then(|log| log.meta.device_id.clone())
            .or_else(|| device_id_from_dir(&device_dir))
            .or(probed_device_id);
        apply_reference(&mut record, table, device_id.as_deref())?;
    }

    info!(
        "[{}] Extracted: patient={}, td_streaming={:?}, duration={}ms, stim_on={:?}",
        record.session_id,
        record.patient_id,
        record.time_domain_streaming,
        record.duration_ms,
        record.stimulation_on
    );
    Ok(record)
}

/// Directory holding the session's log files
pub fn resolve_device_dir(path: &Path) -> PathBuf {
    if path.is_file() {
        return path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
    }
    if is_device_dir_name(path) {
        return path.to_path_buf();
    }

    let mut candidates: Vec<PathBuf> = fs::read_dir(path)
        .into_iter()
        .flatten()
        .flatten()
        .map(|entry| entry.path())
        .filter(|p| p.is_dir() && is_device_dir_name(p))
        .collect();
    candidates.sort();

    if candidates.len() > 1 {
        warn!(
            "Session {:?} has {} device folders, using {:?}",
            path,
            candidates.len(),
            candidates[0]
        );
    }
    candidates
        .into_iter()
        .next()
        .unwrap_or_else(|| path.to_path_buf())
}

fn is_device_dir_name(path: &Path) -> bool {
    path.file_name()
        .map(|name| {
            name.to_string_lossy()
                .to_ascii_lowercase()
                .starts_with(DEVICE_DIR_PREFIX)
        })
        .unwrap_or(false)
}

/// "DeviceNPC700378H" -> "NPC700378H"
fn device_id_from_dir(device_dir: &Path) -> Option<String> {
    let name = device_dir.file_name()?.to_string_lossy().to_string();
    let id = name.get(DEVICE_DIR_PREFIX.len()..)?;
    (is_device_dir_name(device_dir) && !id.is_empty()).then(|| id.to_string())
}

/// Run one reader inside its own failure boundary
fn read_source<R: LogReader>(
    record: &mut SessionMetadataRecord,
    reader: &R,
    dir: &Path,
) -> Option<R::Output> {
    let source = reader.source();
    match reader.read(dir) {
        Ok(Some(output)) => {
            record.record_outcome(source, SourceStatus::Loaded);
            Some(output)
        }
        Ok(None) => {
            warn!(
                "[{}] No {} file ({}) found",
                record.session_id,
                source,
                reader.file_name()
            );
            record.record_outcome(source, SourceStatus::Missing);
            None
        }
        Err(e) => {
            report_failure(record, source, &e);
            None
        }
    }
}

fn report_failure(record: &mut SessionMetadataRecord, source: SourceKind, error: &ReaderError) {
    warn!(
        "[{}] Could not read {}: {}",
        record.session_id, source, error
    );
    record.record_outcome(source, SourceStatus::Failed(error.to_string()));
}

fn apply_device_settings(
    record: &mut SessionMetadataRecord,
    log: &DeviceSettingsLog,
    utc_offset_hours: f64,
) {
    let meta = &log.meta;
    if let Some(subject_id) = &meta.subject_id {
        record.patient_id = normalize_patient_id(subject_id);
    }
    record.patient_side = patient_side(&meta.leads);
    record.target_areas = target_areas(&meta.leads);
    if let Some(diagnosis) = &meta.diagnosis {
        record.diagnosis = diagnosis.clone();
    }
    if let Some(gender) = &meta.gender {
        record.patient_gender = gender.clone();
    }

    record.time_domain_settings = normalize_interval(log.time_domain.clone(), utc_offset_hours);
    record.power_settings = normalize_interval(log.power.clone(), utc_offset_hours);
    record.fft_settings = normalize_interval(log.fft.clone(), utc_offset_hours);
    record.stim_settings = normalize_interval(log.stim_settings.clone(), utc_offset_hours);
    record.detector_settings = normalize_interval(log.detector.clone(), utc_offset_hours);
    record.adaptive_settings = normalize_interval(log.adaptive.clone(), utc_offset_hours);

    let [chan1, chan2, chan3, chan4] = channel_snapshot(&record.time_domain_settings);
    record.chan1 = chan1;
    record.chan2 = chan2;
    record.chan3 = chan3;
    record.chan4 = chan4;

    if let Some(last) = record.adaptive_settings.last() {
        record.embedded_mode = last
            .settings
            .adaptive_mode
            .clone()
            .unwrap_or_else(|| NA.to_string());
        record.target_adaptive_currents = target_adaptive_currents(&last.settings);
    }
}

/// Probe one stream inside its own failure boundary
fn probe_source(
    record: &mut SessionMetadataRecord,
    source: SourceKind,
    path: &Path,
    options: &ProbeOptions,
) -> Option<StreamProbe> {
    match probe(path, options) {
        Ok(result) => {
            let status = if result.method == ProbeMethod::Missing {
                SourceStatus::Missing
            } else {
                SourceStatus::Loaded
            };
            trace!(
                "[{}] {} probe: {:?}",
                record.session_id,
                source,
                result
            );
            record.record_outcome(source, status);
            Some(result)
        }
        Err(e) => {
            warn!(
                "[{}] Could not probe {}: {}",
                record.session_id, source, e
            );
            record.record_outcome(source, SourceStatus::Failed(e.to_string()));
            None
        }
    }
}

fn apply_probe(
    record: &mut SessionMetadataRecord,
    source: SourceKind,
    result: &StreamProbe,
    utc_offset_hours: f64,
) {
    let flag = Some(result.present);
    match source {
        SourceKind::AdaptiveStream => record.detection_streaming = flag,
        SourceKind::TimeDomainStream => {
            record.time_domain_streaming = flag;
            // the time-domain stream defines session start/end for the whole record
            record.session_start = result
                .start_ms
                .and_then(|ms| to_zoned_time(ms, utc_offset_hours).ok());
            record.session_end = result
                .end_ms
                .and_then(|ms| to_zoned_time(ms, utc_offset_hours).ok());
            record.duration_ms =
                interval_duration_ms(record.session_start.as_ref(), record.session_end.as_ref());
        }
        SourceKind::PowerStream => record.power_streaming = flag,
        SourceKind::FftStream => record.fft_streaming = flag,
        SourceKind::AccelerometryStream => record.accelerometry_streaming = flag,
        _ => {}
    }
}

/// Fill patient fields the device settings left at their sentinels
fn apply_reference(
    record: &mut SessionMetadataRecord,
    table: &ReferenceTable,
    device_id: Option<&str>,
) -> Result<(), ReconcileError> {
    let Some(device_id) = device_id else {
        debug!("[{}] No device ID, skipping reference lookup", record.session_id);
        record.record_outcome(SourceKind::ReferenceTable, SourceStatus::Missing);
        return Ok(());
    };

    let entry = match table.lookup(device_id) {
        Ok(Some(entry)) => entry,
        Ok(None) => {
            debug!(
                "[{}] Device {} not in reference table",
                record.session_id, device_id
            );
            record.record_outcome(SourceKind::ReferenceTable, SourceStatus::Missing);
            return Ok(());
        }
        Err(source) => {
            return Err(ReconcileError::Reference {
                session_id: record.session_id.clone(),
                source,
            })
        }
    };

    if record.patient_id == NA {
        record.patient_id = entry.patient_id.clone();
    }
    if record.patient_side.is_none() {
        record.patient_side = entry.side.as_deref().and_then(parse_side);
    }
    if record.target_areas.is_empty() {
        record.target_areas = entry.targets.clone();
    }
    if record.diagnosis == NA {
        if let Some(diagnosis) = &entry.diagnosis {
            record.diagnosis = diagnosis.clone();
        }
    }
    if record.patient_gender == NA {
        if let Some(gender) = &entry.gender {
            record.patient_gender = gender.clone();
        }
    }
    record.record_outcome(SourceKind::ReferenceTable, SourceStatus::Loaded);
    Ok(())
}
