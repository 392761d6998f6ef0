//! StimLog.json: therapy changes made while the session was recording.

use crate::session::parser::time::{change_points_to_intervals, RawInterval};
use crate::session::{SourceKind, StimLogEntry, NA};

use super::types::StimLogRecord;
use super::{LogReader, STIM_LOG_FILE};

#[derive(Debug, Clone, Default)]
pub struct StimLog {
    pub rows: Vec<RawInterval<StimLogEntry>>,
}

pub struct StimLogReader;

impl LogReader for StimLogReader {
    type Record = StimLogRecord;
    type Output = StimLog;

    fn source(&self) -> SourceKind {
        SourceKind::StimLog
    }

    fn file_name(&self) -> &'static str {
        STIM_LOG_FILE
    }

    fn build(&self, records: Vec<StimLogRecord>) -> StimLog {
        let last_host_time = records.iter().rev().find_map(|r| r.host_time());
        let changes = records
            .into_iter()
            .map(|record| {
                let time = record.host_time();
                let entry = StimLogEntry {
                    active_group: record.active_group.as_ref().and_then(|g| g.label()),
                    therapy_on: record.therapy_status.map(|status| status == 1),
                    programs: [record.prog1, record.prog2, record.prog3, record.prog4]
                        .into_iter()
                        .map(|p| p.filter(|text| !text.trim().is_empty()))
                        .collect(),
                };
                (time, entry)
            })
            .collect();

        StimLog {
            rows: change_points_to_intervals(changes, last_host_time),
        }
    }
}

/// Program descriptor in the stim log's own format: "E0-E3+C,2.5mA,60us,130.2Hz"
pub fn program_descriptor(
    electrodes: Option<&str>,
    amp_milliamps: Option<f64>,
    pulse_width_us: Option<f64>,
    rate_hz: Option<f64>,
) -> String {
    let or_na = |v: Option<String>| v.unwrap_or_else(|| NA.to_string());
    format!(
        "{},{}mA,{}us,{}Hz",
        electrodes.unwrap_or(NA),
        or_na(amp_milliamps.map(|v| v.to_string())),
        or_na(pulse_width_us.map(|v| v.to_string())),
        or_na(rate_hz.map(|v| v.to_string())),
    )
}
