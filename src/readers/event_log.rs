//! EventLog.json: patient-entered and device-generated events.

use crate::session::{SourceKind, NA};

use super::types::EventLogRecord;
use super::{LogReader, EVENT_LOG_FILE};

#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub host_unix_time: Option<i64>,
    pub event_type: String,
    pub event_sub_type: String,
}

pub struct EventLogReader;

impl LogReader for EventLogReader {
    type Record = EventLogRecord;
    type Output = Vec<RawEvent>;

    fn source(&self) -> SourceKind {
        SourceKind::EventLog
    }

    fn file_name(&self) -> &'static str {
        EVENT_LOG_FILE
    }

    fn build(&self, records: Vec<EventLogRecord>) -> Vec<RawEvent> {
        records
            .into_iter()
            .filter_map(|record| {
                let host_unix_time = record.host_time();
                // Records without an Event body are session bookkeeping
                let event = record.event?;
                Some(RawEvent {
                    host_unix_time,
                    event_type: event.event_type.unwrap_or_else(|| NA.to_string()),
                    event_sub_type: event.event_sub_type.unwrap_or_else(|| NA.to_string()),
                })
            })
            .collect()
    }
}
