//! Epoch-millisecond to zoned timestamp conversion.
//!
//! Every log type stores host time as epoch milliseconds. The session's own
//! recorded UTC offset is applied, never the offset of the machine running
//! the extraction, so historical sessions always render the same way.

use chrono::{DateTime, FixedOffset, TimeZone};
use log::{trace, warn};
use thiserror::Error;

use crate::session::model::TimedRow;

#[derive(Error, Debug, PartialEq)]
pub enum TimeError {
    #[error("negative epoch timestamp: {0}")]
    NegativeEpoch(i64),

    #[error("epoch timestamp out of range: {0}")]
    OutOfRange(i64),

    #[error("UTC offset out of range: {0}h")]
    InvalidOffset(f64),
}

/// A settings-change row before timestamps are normalized
#[derive(Debug, Clone, PartialEq)]
pub struct RawInterval<T> {
    pub start_ms: Option<i64>,
    pub stop_ms: Option<i64>,
    pub settings: T,
}

/// Fixed-offset zone for a signed, possibly fractional, hour offset
pub fn offset_from_hours(utc_offset_hours: f64) -> Result<FixedOffset, TimeError> {
    if !utc_offset_hours.is_finite() {
        return Err(TimeError::InvalidOffset(utc_offset_hours));
    }
    let seconds = (utc_offset_hours * 3600.0).round() as i32;
    FixedOffset::east_opt(seconds).ok_or(TimeError::InvalidOffset(utc_offset_hours))
}

pub fn to_zoned_time(
    epoch_millis: i64,
    utc_offset_hours: f64,
) -> Result<DateTime<FixedOffset>, TimeError> {
    if epoch_millis < 0 {
        return Err(TimeError::NegativeEpoch(epoch_millis));
    }
    let offset = offset_from_hours(utc_offset_hours)?;
    offset
        .timestamp_millis_opt(epoch_millis)
        .single()
        .ok_or(TimeError::OutOfRange(epoch_millis))
}

/// Parse offsets as logged by the device: "-07:00", "+05:30:00", "-7", "5.5"
pub fn parse_utc_offset(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if !text.contains(':') {
        return text.parse::<f64>().ok().filter(|h| h.is_finite());
    }

    let (sign, body) = match text.as_bytes()[0] {
        b'-' => (-1.0, &text[1..]),
        b'+' => (1.0, &text[1..]),
        _ => (1.0, text),
    };
    let mut parts = body.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next().unwrap_or("0").parse().ok()?;
    Some(sign * (hours + minutes / 60.0))
}

/// `stop - start` in milliseconds; zero when either end is unknown or the
/// interval runs backwards.
pub fn interval_duration_ms(
    start: Option<&DateTime<FixedOffset>>,
    stop: Option<&DateTime<FixedOffset>>,
) -> i64 {
    match (start, stop) {
        (Some(start), Some(stop)) => {
            let millis = stop.signed_duration_since(*start).num_milliseconds();
            if millis < 0 {
                warn!(
                    "Negative interval {} -> {} treated as corrupt, duration set to 0",
                    start, stop
                );
                0
            } else {
                millis
            }
        }
        _ => 0,
    }
}

fn convert_endpoint(millis: Option<i64>, utc_offset_hours: f64) -> Option<DateTime<FixedOffset>> {
    let millis = millis?;
    match to_zoned_time(millis, utc_offset_hours) {
        Ok(time) => Some(time),
        Err(e) => {
            trace!("Dropping unconvertible timestamp: {}", e);
            None
        }
    }
}

/// Map both endpoints of every row and recompute the duration column.
/// A row with a bad endpoint keeps its settings and gets sentinel times.
pub fn normalize_interval<T>(rows: Vec<RawInterval<T>>, utc_offset_hours: f64) -> Vec<TimedRow<T>> {
    rows.into_iter()
        .map(|row| {
            let start = convert_endpoint(row.start_ms, utc_offset_hours);
            let stop = convert_endpoint(row.stop_ms, utc_offset_hours);
            let duration_ms = interval_duration_ms(start.as_ref(), stop.as_ref());
            TimedRow {
                start,
                stop,
                duration_ms,
                settings: row.settings,
            }
        })
        .collect()
}

/// Turn a list of change points into intervals: each row lasts until the
/// next change, the final one until `last_seen_ms`.
pub fn change_points_to_intervals<T>(
    changes: Vec<(Option<i64>, T)>,
    last_seen_ms: Option<i64>,
) -> Vec<RawInterval<T>> {
    let starts: Vec<Option<i64>> = changes.iter().map(|(start, _)| *start).collect();
    changes
        .into_iter()
        .enumerate()
        .map(|(index, (start_ms, settings))| {
            let stop_ms = match starts.get(index + 1) {
                Some(next) => *next,
                None => last_seen_ms,
            };
            RawInterval {
                start_ms,
                stop_ms,
                settings,
            }
        })
        .collect()
}
