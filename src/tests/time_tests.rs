use chrono::Timelike;

use crate::session::parser::time::{
    change_points_to_intervals, interval_duration_ms, normalize_interval, offset_from_hours,
    parse_utc_offset, RawInterval,
};
use crate::session::parser::{to_zoned_time, TimeError};

use super::test_helpers::SESSION_START_MS;

#[test]
fn test_to_zoned_time_applies_session_offset() {
    let time = to_zoned_time(SESSION_START_MS, -8.0).unwrap();

    assert_eq!(time.offset().local_minus_utc(), -8 * 3600);
    assert_eq!((time.hour(), time.minute(), time.second()), (9, 17, 28));
    assert_eq!(time.timestamp_millis(), SESSION_START_MS);
    assert_eq!(time.to_rfc3339(), "2020-12-15T09:17:28.432-08:00");
}

#[test]
fn test_to_zoned_time_keeps_fractional_offset_minutes() {
    let time = to_zoned_time(SESSION_START_MS, 5.5).unwrap();
    assert_eq!(time.offset().local_minus_utc(), 5 * 3600 + 30 * 60);
}

#[test]
fn test_to_zoned_time_round_trips_epoch_and_offset() {
    let epochs = [0_i64, 1, SESSION_START_MS, 4_102_444_800_123];
    let offsets = [-12.0, -7.0, 0.0, 5.5, 5.75, 14.0];

    for &epoch in &epochs {
        for &hours in &offsets {
            let time = to_zoned_time(epoch, hours).unwrap();
            assert_eq!(time.timestamp_millis(), epoch, "epoch {} at {}h", epoch, hours);
            assert_eq!(
                time.offset().local_minus_utc(),
                (hours * 3600.0) as i32,
                "offset for {}h",
                hours
            );
        }
    }
}

#[test]
fn test_to_zoned_time_rejects_negative_epoch() {
    assert_eq!(to_zoned_time(-1, 0.0), Err(TimeError::NegativeEpoch(-1)));
}

#[test]
fn test_offset_out_of_range_is_an_error() {
    assert!(offset_from_hours(30.0).is_err());
    assert!(offset_from_hours(f64::NAN).is_err());
    assert!(offset_from_hours(-7.0).is_ok());
}

#[test]
fn test_parse_utc_offset_formats() {
    assert_eq!(parse_utc_offset("-07:00"), Some(-7.0));
    assert_eq!(parse_utc_offset("+05:30:00"), Some(5.5));
    assert_eq!(parse_utc_offset("-7"), Some(-7.0));
    assert_eq!(parse_utc_offset("5.5"), Some(5.5));
    assert_eq!(parse_utc_offset(""), None);
    assert_eq!(parse_utc_offset("PST"), None);
}

#[test]
fn test_normalize_interval_recomputes_duration() {
    let rows = vec![
        RawInterval {
            start_ms: Some(SESSION_START_MS),
            stop_ms: Some(SESSION_START_MS + 60_000),
            settings: "first",
        },
        RawInterval {
            start_ms: Some(SESSION_START_MS + 60_000),
            stop_ms: None,
            settings: "second",
        },
    ];

    let normalized = normalize_interval(rows, -8.0);

    assert_eq!(normalized.len(), 2);
    assert_eq!(normalized[0].duration_ms, 60_000);
    assert_eq!(normalized[0].settings, "first");
    assert!(normalized[1].start.is_some());
    assert_eq!(normalized[1].stop, None);
    assert_eq!(normalized[1].duration_ms, 0);
}

#[test]
fn test_normalize_interval_zeroes_negative_duration() {
    // Scenario: stop earlier than start (corrupt row)
    // Expected: both times kept, duration 0
    let rows = vec![RawInterval {
        start_ms: Some(SESSION_START_MS + 5_000),
        stop_ms: Some(SESSION_START_MS),
        settings: (),
    }];

    let normalized = normalize_interval(rows, 0.0);

    assert!(normalized[0].start.is_some());
    assert!(normalized[0].stop.is_some());
    assert_eq!(normalized[0].duration_ms, 0);
}

#[test]
fn test_normalize_interval_drops_unconvertible_endpoint() {
    let rows = vec![RawInterval {
        start_ms: Some(-5),
        stop_ms: Some(SESSION_START_MS),
        settings: 1u8,
    }];

    let normalized = normalize_interval(rows, 0.0);

    assert_eq!(normalized[0].start, None);
    assert_eq!(normalized[0].duration_ms, 0);
    assert_eq!(normalized[0].settings, 1);
}

#[test]
fn test_interval_duration_needs_both_ends() {
    let start = to_zoned_time(SESSION_START_MS, 0.0).unwrap();
    assert_eq!(interval_duration_ms(Some(&start), None), 0);
    assert_eq!(interval_duration_ms(None, Some(&start)), 0);
    assert_eq!(interval_duration_ms(Some(&start), Some(&start)), 0);
}

#[test]
fn test_change_points_become_intervals() {
    let changes = vec![(Some(100), 'a'), (Some(250), 'b'), (Some(400), 'c')];

    let intervals = change_points_to_intervals(changes, Some(900));

    let spans: Vec<_> = intervals
        .iter()
        .map(|row| (row.start_ms, row.stop_ms, row.settings))
        .collect();
    assert_eq!(
        spans,
        vec![
            (Some(100), Some(250), 'a'),
            (Some(250), Some(400), 'b'),
            (Some(400), Some(900), 'c'),
        ]
    );
}
