//! SQLite metadata database.
//!
//! Writes go through a staging table: a batch is first written into
//! `session_metadata_staging`, then swapped into `session_metadata` inside a
//! single transaction. A failure at any point leaves the main table as it was.

use chrono::{DateTime, FixedOffset};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::session::parser::snapshot::parse_side;
use crate::session::{PatientSide, RecordingApplication, SessionMetadataRecord};

const CURRENT_SCHEMA_VERSION: i32 = 1;

const MAIN_TABLE: &str = "session_metadata";
const STAGING_TABLE: &str = "session_metadata_staging";

/// Column order shared by both tables, the insert and the select
const COLUMNS: [&str; 40] = [
    "session_id",
    "device_settings_path",
    "recording_application",
    "patient_id",
    "patient_side",
    "area",
    "target_areas",
    "diagnosis",
    "patient_gender",
    "session_start",
    "session_end",
    "duration_ms",
    "chan1",
    "chan2",
    "chan3",
    "chan4",
    "stimulation_on",
    "active_group",
    "electrode_config",
    "amplitude_milliamps",
    "rate_hz",
    "full_stim_settings_text",
    "num_stim_settings_changes",
    "embedded_mode",
    "target_adaptive_currents",
    "detection_streaming",
    "time_domain_streaming",
    "power_streaming",
    "fft_streaming",
    "accelerometry_streaming",
    "time_domain_settings",
    "power_settings",
    "fft_settings",
    "stim_settings",
    "stim_log",
    "detector_settings",
    "adaptive_settings",
    "event_log",
    "source_status",
    "written_at",
];

#[derive(Error, Debug)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to encode nested table: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to create database directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("database version ({found}) is newer than supported schema ({supported})")]
    SchemaTooNew { found: i32, supported: i32 },

    #[error("stored row for {session_id} is invalid: {message}")]
    Corrupt { session_id: String, message: String },
}

pub struct MetadataDatabase {
    conn: Connection,
}

impl MetadataDatabase {
    /// Open (creating and migrating as needed) the database at `path`
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| DbError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let mut conn = Connection::open(path)?;
        run_migrations(&mut conn)?;
        log::debug!("Opened metadata database at {:?}", path);
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, DbError> {
        let mut conn = Connection::open_in_memory()?;
        run_migrations(&mut conn)?;
        Ok(Self { conn })
    }

    /// Stage `records`, then replace their rows in the main table atomically.
    /// Returns the number of rows written.
    pub fn write_records(&mut self, records: &[SessionMetadataRecord]) -> Result<usize, DbError> {
        if records.is_empty() {
            return Ok(0);
        }

        // Encode everything before touching the database
        let written_at = chrono::Utc::now().to_rfc3339();
        let rows = records
            .iter()
            .map(|record| StoredRow::from_record(record, &written_at))
            .collect::<Result<Vec<_>, _>>()?;

        let tx = self.conn.transaction()?;
        tx.execute(&format!("DELETE FROM {STAGING_TABLE}"), [])?;
        for row in &rows {
            row.insert(&tx, STAGING_TABLE)?;
        }
        tx.commit()?;
        log::debug!("Staged {} metadata row(s)", rows.len());

        let tx = self.conn.transaction()?;
        swap_staged(&tx)?;
        tx.commit()?;

        log::info!("Wrote {} session metadata row(s)", rows.len());
        Ok(rows.len())
    }

    pub fn load_record(&self, session_id: &str) -> Result<Option<SessionMetadataRecord>, DbError> {
        let sql = format!(
            "SELECT {} FROM {MAIN_TABLE} WHERE session_id = ?1",
            COLUMNS.join(", ")
        );
        let row = self
            .conn
            .query_row(&sql, params![session_id], StoredRow::from_row)
            .optional()?;
        row.map(StoredRow::into_record).transpose()
    }

    pub fn session_ids(&self) -> Result<Vec<String>, DbError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT session_id FROM {MAIN_TABLE} ORDER BY session_id"))?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Rows left in the staging table; zero after every completed write
    pub fn staged_count(&self) -> Result<usize, DbError> {
        let count: i64 =
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {STAGING_TABLE}"), [], |row| {
                    row.get(0)
                })?;
        Ok(count.max(0) as usize)
    }
}

fn swap_staged(tx: &Transaction<'_>) -> Result<(), DbError> {
    let columns = COLUMNS.join(", ");
    tx.execute(
        &format!(
            "DELETE FROM {MAIN_TABLE} WHERE session_id IN (SELECT session_id FROM {STAGING_TABLE})"
        ),
        [],
    )?;
    tx.execute(
        &format!("INSERT INTO {MAIN_TABLE} ({columns}) SELECT {columns} FROM {STAGING_TABLE}"),
        [],
    )?;
    tx.execute(&format!("DELETE FROM {STAGING_TABLE}"), [])?;
    Ok(())
}

fn run_migrations(conn: &mut Connection) -> Result<(), DbError> {
    let mut version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version > CURRENT_SCHEMA_VERSION {
        return Err(DbError::SchemaTooNew {
            found: version,
            supported: CURRENT_SCHEMA_VERSION,
        });
    }
    if version == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    while version < CURRENT_SCHEMA_VERSION {
        let next_version = version + 1;
        apply_migration(&tx, next_version)?;
        version = next_version;
    }
    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)?;
    tx.commit()?;

    log::info!("Migrated metadata database to schema v{}", CURRENT_SCHEMA_VERSION);
    Ok(())
}

fn apply_migration(tx: &Transaction<'_>, version: i32) -> Result<(), DbError> {
    match version {
        1 => {
            tx.execute_batch(&table_ddl(MAIN_TABLE))?;
            tx.execute_batch(&table_ddl(STAGING_TABLE))?;
            Ok(())
        }
        _ => Ok(()),
    }
}

fn table_ddl(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            session_id TEXT PRIMARY KEY NOT NULL,
            device_settings_path TEXT NOT NULL,
            recording_application TEXT NOT NULL,
            patient_id TEXT NOT NULL,
            patient_side TEXT,
            area TEXT NOT NULL,
            target_areas TEXT NOT NULL,
            diagnosis TEXT NOT NULL,
            patient_gender TEXT NOT NULL,
            session_start TEXT,
            session_end TEXT,
            duration_ms INTEGER NOT NULL,
            chan1 TEXT NOT NULL,
            chan2 TEXT NOT NULL,
            chan3 TEXT NOT NULL,
            chan4 TEXT NOT NULL,
            stimulation_on INTEGER,
            active_group TEXT NOT NULL,
            electrode_config TEXT NOT NULL,
            amplitude_milliamps REAL,
            rate_hz REAL,
            full_stim_settings_text TEXT NOT NULL,
            num_stim_settings_changes INTEGER NOT NULL,
            embedded_mode TEXT NOT NULL,
            target_adaptive_currents TEXT NOT NULL,
            detection_streaming INTEGER,
            time_domain_streaming INTEGER,
            power_streaming INTEGER,
            fft_streaming INTEGER,
            accelerometry_streaming INTEGER,
            time_domain_settings TEXT NOT NULL,
            power_settings TEXT NOT NULL,
            fft_settings TEXT NOT NULL,
            stim_settings TEXT NOT NULL,
            stim_log TEXT NOT NULL,
            detector_settings TEXT NOT NULL,
            adaptive_settings TEXT NOT NULL,
            event_log TEXT NOT NULL,
            source_status TEXT NOT NULL,
            written_at TEXT NOT NULL
        );"
    )
}

fn application_label(app: RecordingApplication) -> &'static str {
    match app {
        RecordingApplication::StreamingApp => "StreamingApp",
        RecordingApplication::ResearchApp => "ResearchApp",
    }
}

fn parse_application(text: &str) -> Option<RecordingApplication> {
    match text {
        "StreamingApp" => Some(RecordingApplication::StreamingApp),
        "ResearchApp" => Some(RecordingApplication::ResearchApp),
        _ => None,
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, DbError> {
    Ok(serde_json::to_string(value)?)
}

/// One row in SQLite-native types
struct StoredRow {
    session_id: String,
    device_settings_path: String,
    recording_application: String,
    patient_id: String,
    patient_side: Option<String>,
    area: String,
    target_areas: String,
    diagnosis: String,
    patient_gender: String,
    session_start: Option<String>,
    session_end: Option<String>,
    duration_ms: i64,
    chans: [String; 4],
    stimulation_on: Option<bool>,
    active_group: String,
    electrode_config: String,
    amplitude_milliamps: Option<f64>,
    rate_hz: Option<f64>,
    full_stim_settings_text: String,
    num_stim_settings_changes: i64,
    embedded_mode: String,
    target_adaptive_currents: String,
    streaming: [Option<bool>; 5],
    time_domain_settings: String,
    power_settings: String,
    fft_settings: String,
    stim_settings: String,
    stim_log: String,
    detector_settings: String,
    adaptive_settings: String,
    event_log: String,
    source_status: String,
    written_at: String,
}

impl StoredRow {
    fn from_record(record: &SessionMetadataRecord, written_at: &str) -> Result<Self, DbError> {
        Ok(Self {
            session_id: record.session_id.clone(),
            device_settings_path: record.device_settings_path.clone(),
            recording_application: application_label(record.recording_application).to_string(),
            patient_id: record.patient_id.clone(),
            patient_side: record.patient_side.map(|side| side.as_str().to_string()),
            area: record.area(),
            target_areas: to_json(&record.target_areas)?,
            diagnosis: record.diagnosis.clone(),
            patient_gender: record.patient_gender.clone(),
            session_start: record.session_start.map(|t| t.to_rfc3339()),
            session_end: record.session_end.map(|t| t.to_rfc3339()),
            duration_ms: record.duration_ms,
            chans: [
                record.chan1.clone(),
                record.chan2.clone(),
                record.chan3.clone(),
                record.chan4.clone(),
            ],
            stimulation_on: record.stimulation_on,
            active_group: record.active_group.clone(),
            electrode_config: record.electrode_config.clone(),
            amplitude_milliamps: record.amplitude_milliamps,
            rate_hz: record.rate_hz,
            full_stim_settings_text: record.full_stim_settings_text.clone(),
            num_stim_settings_changes: record.num_stim_settings_changes as i64,
            embedded_mode: record.embedded_mode.clone(),
            target_adaptive_currents: to_json(&record.target_adaptive_currents)?,
            streaming: [
                record.detection_streaming,
                record.time_domain_streaming,
                record.power_streaming,
                record.fft_streaming,
                record.accelerometry_streaming,
            ],
            time_domain_settings: to_json(&record.time_domain_settings)?,
            power_settings: to_json(&record.power_settings)?,
            fft_settings: to_json(&record.fft_settings)?,
            stim_settings: to_json(&record.stim_settings)?,
            stim_log: to_json(&record.stim_log)?,
            detector_settings: to_json(&record.detector_settings)?,
            adaptive_settings: to_json(&record.adaptive_settings)?,
            event_log: to_json(&record.event_log)?,
            source_status: to_json(&record.source_status)?,
            written_at: written_at.to_string(),
        })
    }

    fn insert(&self, tx: &Transaction<'_>, table: &str) -> Result<(), DbError> {
        let placeholders = (1..=COLUMNS.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT OR REPLACE INTO {table} ({}) VALUES ({placeholders})",
            COLUMNS.join(", ")
        );
        let [chan1, chan2, chan3, chan4] = &self.chans;
        let [detection, time_domain, power, fft, accel] = self.streaming;
        tx.execute(
            &sql,
            params![
                self.session_id,
                self.device_settings_path,
                self.recording_application,
                self.patient_id,
                self.patient_side,
                self.area,
                self.target_areas,
                self.diagnosis,
                self.patient_gender,
                self.session_start,
                self.session_end,
                self.duration_ms,
                chan1,
                chan2,
                chan3,
                chan4,
                self.stimulation_on,
                self.active_group,
                self.electrode_config,
                self.amplitude_milliamps,
                self.rate_hz,
                self.full_stim_settings_text,
                self.num_stim_settings_changes,
                self.embedded_mode,
                self.target_adaptive_currents,
                detection,
                time_domain,
                power,
                fft,
                accel,
                self.time_domain_settings,
                self.power_settings,
                self.fft_settings,
                self.stim_settings,
                self.stim_log,
                self.detector_settings,
                self.adaptive_settings,
                self.event_log,
                self.source_status,
                self.written_at,
            ],
        )?;
        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            session_id: row.get("session_id")?,
            device_settings_path: row.get("device_settings_path")?,
            recording_application: row.get("recording_application")?,
            patient_id: row.get("patient_id")?,
            patient_side: row.get("patient_side")?,
            area: row.get("area")?,
            target_areas: row.get("target_areas")?,
            diagnosis: row.get("diagnosis")?,
            patient_gender: row.get("patient_gender")?,
            session_start: row.get("session_start")?,
            session_end: row.get("session_end")?,
            duration_ms: row.get("duration_ms")?,
            chans: [
                row.get("chan1")?,
                row.get("chan2")?,
                row.get("chan3")?,
                row.get("chan4")?,
            ],
            stimulation_on: row.get("stimulation_on")?,
            active_group: row.get("active_group")?,
            electrode_config: row.get("electrode_config")?,
            amplitude_milliamps: row.get("amplitude_milliamps")?,
            rate_hz: row.get("rate_hz")?,
            full_stim_settings_text: row.get("full_stim_settings_text")?,
            num_stim_settings_changes: row.get("num_stim_settings_changes")?,
            embedded_mode: row.get("embedded_mode")?,
            target_adaptive_currents: row.get("target_adaptive_currents")?,
            streaming: [
                row.get("detection_streaming")?,
                row.get("time_domain_streaming")?,
                row.get("power_streaming")?,
                row.get("fft_streaming")?,
                row.get("accelerometry_streaming")?,
            ],
            time_domain_settings: row.get("time_domain_settings")?,
            power_settings: row.get("power_settings")?,
            fft_settings: row.get("fft_settings")?,
            stim_settings: row.get("stim_settings")?,
            stim_log: row.get("stim_log")?,
            detector_settings: row.get("detector_settings")?,
            adaptive_settings: row.get("adaptive_settings")?,
            event_log: row.get("event_log")?,
            source_status: row.get("source_status")?,
            written_at: row.get("written_at")?,
        })
    }

    fn into_record(self) -> Result<SessionMetadataRecord, DbError> {
        let id = self.session_id.as_str();
        let recording_application =
            parse_application(&self.recording_application).ok_or_else(|| {
                corrupt(
                    id,
                    format!("unknown application {}", self.recording_application),
                )
            })?;
        let patient_side: Option<PatientSide> = self.patient_side.as_deref().and_then(parse_side);
        let [chan1, chan2, chan3, chan4] = self.chans.clone();
        let [detection, time_domain, power, fft, accel] = self.streaming;

        Ok(SessionMetadataRecord {
            session_id: self.session_id.clone(),
            device_settings_path: self.device_settings_path.clone(),
            recording_application,
            patient_id: self.patient_id.clone(),
            patient_side,
            target_areas: decode_column(id, "target_areas", &self.target_areas)?,
            diagnosis: self.diagnosis.clone(),
            patient_gender: self.patient_gender.clone(),
            session_start: decode_time(id, "session_start", self.session_start.as_deref())?,
            session_end: decode_time(id, "session_end", self.session_end.as_deref())?,
            duration_ms: self.duration_ms,
            chan1,
            chan2,
            chan3,
            chan4,
            stimulation_on: self.stimulation_on,
            active_group: self.active_group.clone(),
            electrode_config: self.electrode_config.clone(),
            amplitude_milliamps: self.amplitude_milliamps,
            rate_hz: self.rate_hz,
            full_stim_settings_text: self.full_stim_settings_text.clone(),
            num_stim_settings_changes: self.num_stim_settings_changes.max(0) as usize,
            embedded_mode: self.embedded_mode.clone(),
            target_adaptive_currents: decode_column(
                id,
                "target_adaptive_currents",
                &self.target_adaptive_currents,
            )?,
            detection_streaming: detection,
            time_domain_streaming: time_domain,
            power_streaming: power,
            fft_streaming: fft,
            accelerometry_streaming: accel,
            time_domain_settings: decode_column(
                id,
                "time_domain_settings",
                &self.time_domain_settings,
            )?,
            power_settings: decode_column(id, "power_settings", &self.power_settings)?,
            fft_settings: decode_column(id, "fft_settings", &self.fft_settings)?,
            stim_settings: decode_column(id, "stim_settings", &self.stim_settings)?,
            stim_log: decode_column(id, "stim_log", &self.stim_log)?,
            detector_settings: decode_column(id, "detector_settings", &self.detector_settings)?,
            adaptive_settings: decode_column(id, "adaptive_settings", &self.adaptive_settings)?,
            event_log: decode_column(id, "event_log", &self.event_log)?,
            source_status: decode_column(id, "source_status", &self.source_status)?,
        })
    }
}

fn corrupt(session_id: &str, message: String) -> DbError {
    DbError::Corrupt {
        session_id: session_id.to_string(),
        message,
    }
}

fn decode_column<T: DeserializeOwned>(
    session_id: &str,
    column: &str,
    text: &str,
) -> Result<T, DbError> {
    serde_json::from_str(text).map_err(|e| corrupt(session_id, format!("{column}: {e}")))
}

fn decode_time(
    session_id: &str,
    column: &str,
    text: Option<&str>,
) -> Result<Option<DateTime<FixedOffset>>, DbError> {
    text.map(DateTime::parse_from_rfc3339)
        .transpose()
        .map_err(|e| corrupt(session_id, format!("{column}: {e}")))
}
