use serde_json::json;
use std::path::Path;
use tempfile::TempDir;

use crate::readers::types::{DeviceSettingsRecord, GroupField};
use crate::readers::{
    decode_records, program_descriptor, repair_json, DeviceSettingsReader, EventLogReader,
    LogReader, ReaderError, StimLogReader,
};

use super::test_helpers::{
    device_settings_json, event_log_json, stim_log_json, SessionFixture, DEVICE_ID,
    SESSION_END_MS, SESSION_START_MS,
};

fn path() -> &'static Path {
    Path::new("DeviceSettings.json")
}

#[test]
fn test_repair_leaves_balanced_json_alone() {
    let input = br#"[{"a":1},{"a":2}]"#;
    assert_eq!(repair_json(input).as_ref(), input.as_slice());
}

#[test]
fn test_repair_closes_truncated_array() {
    // Scenario: device crashed mid-record
    // Expected: partial record dropped, array closed
    let repaired = repair_json(br#"[{"a":1},{"a":2},{"a":"#);
    assert_eq!(repaired.as_ref(), br#"[{"a":1},{"a":2}]"#.as_slice());
}

#[test]
fn test_repair_strips_dangling_comma_and_padding() {
    let repaired = repair_json(b"[{\"a\":1},\n\0\0\0");
    assert_eq!(repaired.as_ref(), br#"[{"a":1}]"#.as_slice());
}

#[test]
fn test_repair_drops_record_cut_after_nested_object() {
    // Scenario: crash after the partial record's RecordInfo was written
    // Expected: the whole partial record is dropped, not closed off
    let repaired = repair_json(
        br#"[{"RecordInfo":{"HostUnixTime":1},"therapyStatus":1},{"RecordInfo":{"HostUnixTime":2},"therapyStatus":0,"stimParams_prog1":"E1-E"#,
    );
    let value: serde_json::Value = serde_json::from_slice(&repaired).unwrap();
    assert_eq!(
        value,
        json!([{"RecordInfo": {"HostUnixTime": 1}, "therapyStatus": 1}])
    );
}

#[test]
fn test_repair_leaves_truncated_single_object_unparseable() {
    let input = br#"{"RecordInfo":{"HostUnixTime":5},"SubjectInfo":{"ID":"RC"#;

    assert_eq!(repair_json(input).as_ref(), input.as_slice());
    assert!(matches!(
        decode_records::<DeviceSettingsRecord>(path(), input),
        Err(ReaderError::Json { .. })
    ));
}

#[test]
fn test_decode_accepts_array_or_single_object() {
    let array = br#"[{"HostUnixTime":1},{"HostUnixTime":2}]"#;
    let single = br#"{"HostUnixTime":3}"#;

    let from_array: Vec<DeviceSettingsRecord> = decode_records(path(), array).unwrap();
    let from_single: Vec<DeviceSettingsRecord> = decode_records(path(), single).unwrap();

    assert_eq!(from_array.len(), 2);
    assert_eq!(from_single.len(), 1);
    assert_eq!(from_single[0].host_time(), Some(3));
}

#[test]
fn test_decode_empty_file_is_an_error() {
    let result = decode_records::<DeviceSettingsRecord>(path(), b"  \n");
    assert!(matches!(result, Err(ReaderError::Empty { .. })));
}

#[test]
fn test_decode_schema_violation_names_the_record() {
    let bytes = br#"[{"HostUnixTime":1},{"SubjectInfo":5}]"#;
    let result = decode_records::<DeviceSettingsRecord>(path(), bytes);
    assert!(
        matches!(result, Err(ReaderError::Schema { index: 1, .. })),
        "Expected a schema error on record 1, got {:?}",
        result.map(|r| r.len())
    );
}

#[test]
fn test_decode_scalar_top_level_is_a_schema_error() {
    let result = decode_records::<DeviceSettingsRecord>(path(), b"42");
    assert!(matches!(result, Err(ReaderError::Schema { index: 0, .. })));
}

#[test]
fn test_reader_absent_file_is_none() {
    let dir = TempDir::new().unwrap();
    assert!(StimLogReader.read(dir.path()).unwrap().is_none());
}

#[test]
fn test_device_settings_reader_builds_tables() {
    let fixture = SessionFixture::new();
    fixture.write_json("DeviceSettings.json", &device_settings_json());

    let log = DeviceSettingsReader.read(&fixture.device_dir).unwrap().unwrap();

    assert_eq!(log.meta.subject_id.as_deref(), Some("RCS02L"));
    assert_eq!(log.meta.device_id.as_deref(), Some(DEVICE_ID));
    assert_eq!(log.meta.utc_offset_hours, Some(-8.0));
    assert_eq!(log.meta.leads.len(), 2);
    assert_eq!(log.last_host_time, Some(SESSION_END_MS));

    assert_eq!(log.time_domain.len(), 1);
    let td = &log.time_domain[0];
    assert_eq!(td.start_ms, Some(SESSION_START_MS));
    assert_eq!(td.stop_ms, Some(SESSION_END_MS));
    assert_eq!(
        td.settings.channels,
        vec![
            "+2-0 lpf1-450Hz lpf2-1700Hz sr-500Hz",
            "+3-1 lpf1-450Hz lpf2-1700Hz sr-500Hz",
            "disabled",
            "disabled",
        ]
    );
    assert_eq!(td.settings.sample_rate_hz, Some(500.0));

    assert_eq!(log.power[0].settings.bands, vec!["0:20-25Hz"]);
    assert_eq!(log.fft[0].settings.size, Some(256));
    assert_eq!(
        log.stim_settings[0].settings.programs,
        vec!["Group A: E0-E3+C,2.5mA,60us,130.2Hz"]
    );
    assert_eq!(log.stim_settings[0].settings.active_group.as_deref(), Some("A"));
    assert!(log.detector.is_empty());

    let adaptive = &log.adaptive[0].settings;
    assert_eq!(adaptive.adaptive_mode.as_deref(), Some("Embedded"));
    assert_eq!(adaptive.states.len(), 4);
    assert_eq!(adaptive.states[0].amp_milliamps, Some(2.5));
}

#[test]
fn test_out_of_range_utc_offset_is_dropped() {
    let fixture = SessionFixture::new();
    let mut settings = device_settings_json();
    settings[0]["UtcOffset"] = json!(30);
    fixture.write_json("DeviceSettings.json", &settings);

    let log = DeviceSettingsReader.read(&fixture.device_dir).unwrap().unwrap();

    assert_eq!(log.meta.utc_offset_hours, None);
    assert_eq!(log.meta.subject_id.as_deref(), Some("RCS02L"));
}

#[test]
fn test_later_record_supplies_valid_utc_offset() {
    let fixture = SessionFixture::new();
    let mut settings = device_settings_json();
    settings[0]["UtcOffset"] = json!("+99:00");
    settings[1]["UtcOffset"] = json!(5.5);
    fixture.write_json("DeviceSettings.json", &settings);

    let log = DeviceSettingsReader.read(&fixture.device_dir).unwrap().unwrap();

    assert_eq!(log.meta.utc_offset_hours, Some(5.5));
}

#[test]
fn test_device_settings_change_rows_chain_into_intervals() {
    let fixture = SessionFixture::new();
    fixture.write_json(
        "DeviceSettings.json",
        &json!([
            {"HostUnixTime": 1000, "SensingConfig": {"fftConfig": {"size": 64}}},
            {"HostUnixTime": 2000, "SensingConfig": {"fftConfig": {"size": 256}}},
            {"HostUnixTime": 5000}
        ]),
    );

    let log = DeviceSettingsReader.read(&fixture.device_dir).unwrap().unwrap();

    let spans: Vec<_> = log
        .fft
        .iter()
        .map(|row| (row.start_ms, row.stop_ms, row.settings.size))
        .collect();
    assert_eq!(
        spans,
        vec![(Some(1000), Some(2000), Some(64)), (Some(2000), Some(5000), Some(256))]
    );
}

#[test]
fn test_adaptive_states_capped_at_nine() {
    let states: Vec<_> = (0..12)
        .map(|i| json!({"isValid": true, "ampInMilliamps": [i as f64]}))
        .collect();
    let fixture = SessionFixture::new();
    fixture.write_json(
        "DeviceSettings.json",
        &json!({"HostUnixTime": 1000, "AdaptiveConfig": {"states": states}}),
    );

    let log = DeviceSettingsReader.read(&fixture.device_dir).unwrap().unwrap();

    assert_eq!(log.adaptive[0].settings.states.len(), 9);
}

#[test]
fn test_stim_log_reader_rows() {
    let fixture = SessionFixture::new();
    fixture.write_json("StimLog.json", &stim_log_json());

    let log = StimLogReader.read(&fixture.device_dir).unwrap().unwrap();

    assert_eq!(log.rows.len(), 3);
    assert_eq!(log.rows[0].stop_ms, Some(1608052680000));
    assert_eq!(log.rows[2].stop_ms, Some(1608052700000));
    let last = &log.rows[2].settings;
    assert_eq!(last.active_group.as_deref(), Some("A"));
    assert_eq!(last.therapy_on, Some(true));
    assert_eq!(
        last.programs,
        vec![Some("E0-E3+C,3.0mA,60us,130.2Hz".to_string()), None, None, None]
    );
}

#[test]
fn test_event_log_skips_records_without_event() {
    let fixture = SessionFixture::new();
    fixture.write_json("EventLog.json", &event_log_json());

    let events = EventLogReader.read(&fixture.device_dir).unwrap().unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "extra_comments");
    assert_eq!(events[0].host_unix_time, Some(1608052660000));
}

#[test]
fn test_truncated_log_still_reads() {
    let fixture = SessionFixture::new();
    let mut content = serde_json::to_string(&event_log_json()).unwrap();
    content.truncate(content.len() - 12);
    fixture.write_raw("EventLog.json", &content);

    let events = EventLogReader.read(&fixture.device_dir).unwrap().unwrap();

    assert_eq!(events.len(), 1);
}

#[test]
fn test_group_labels() {
    assert_eq!(GroupField::Index(1).label().as_deref(), Some("B"));
    assert_eq!(GroupField::Index(7).label(), None);
    assert_eq!(GroupField::Name("Group C".into()).label().as_deref(), Some("C"));
}

#[test]
fn test_program_descriptor_marks_missing_parts() {
    assert_eq!(
        program_descriptor(Some("E0-E3+C"), Some(2.5), Some(60.0), Some(130.2)),
        "E0-E3+C,2.5mA,60us,130.2Hz"
    );
    assert_eq!(
        program_descriptor(None, Some(1.0), None, None),
        "NA,1mA,NAus,NAHz"
    );
}
