use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use crate::batch::{discover_sessions, filter_by_age, run_batch, run_pool, FailureKind};
use crate::config::ReconcilerConfig;
use crate::reference::{ReferenceEntry, ReferenceTable};
use crate::session::parser::SessionIdError;
use crate::session::{ReconcileError, RecordingApplication, SessionMetadataRecord};

use super::test_helpers::{stream_json, DEVICE_ID};

fn make_session(root: &Path, patient: &str, name: &str) -> PathBuf {
    let device_dir = root
        .join("SummitContinuousBilateralStreaming")
        .join(patient)
        .join(name)
        .join(format!("Device{}", DEVICE_ID));
    fs::create_dir_all(&device_dir).unwrap();
    fs::write(
        device_dir.join("RawDataTD.json"),
        stream_json("TimeDomainData", 1_608_052_648_432, 1_608_052_708_432, 4),
    )
    .unwrap();
    device_dir.parent().unwrap().to_path_buf()
}

fn stub_record(dir: &Path) -> SessionMetadataRecord {
    let name = dir.file_name().unwrap().to_string_lossy().to_string();
    SessionMetadataRecord::new(name, String::new(), RecordingApplication::ResearchApp)
}

#[test]
fn test_discover_sessions_walks_tree() {
    let root = TempDir::new().unwrap();
    let a = make_session(root.path(), "RCS02L", "Session1608052648432");
    let b = make_session(root.path(), "RCS05R", "session1608052999999");
    fs::create_dir_all(root.path().join("RCS02L").join("Session123_backup")).unwrap();
    fs::write(root.path().join("Session1608050000000"), "not a folder").unwrap();

    let found = discover_sessions(root.path());

    let mut expected = vec![a, b];
    expected.sort();
    assert_eq!(found, expected);
}

#[test]
fn test_discover_does_not_descend_into_sessions() {
    let root = TempDir::new().unwrap();
    let outer = make_session(root.path(), "RCS02L", "Session1608052648432");
    fs::create_dir_all(outer.join("Session1608052648433")).unwrap();

    assert_eq!(discover_sessions(root.path()), vec![outer]);
}

#[test]
fn test_filter_by_age_holds_back_recent_sessions() {
    let now = Utc.timestamp_millis_opt(1_608_052_648_432).unwrap() + ChronoDuration::hours(3);
    let old = PathBuf::from("/data/Session1608052648432");
    let recent = PathBuf::from(format!(
        "/data/Session{}",
        (now - ChronoDuration::minutes(30)).timestamp_millis()
    ));
    let unparseable = PathBuf::from("/data/SessionUnknown");

    let (ready, young) = filter_by_age(
        vec![old.clone(), recent.clone(), unparseable.clone()],
        1.0,
        now,
    );

    assert_eq!(ready, vec![old, unparseable]);
    assert_eq!(young, vec![recent]);
}

#[test]
fn test_filter_disabled_at_zero_hours() {
    let sessions = vec![PathBuf::from(format!("/data/Session{}", Utc::now().timestamp_millis()))];
    let (ready, young) = filter_by_age(sessions.clone(), 0.0, Utc::now());

    assert_eq!(ready, sessions);
    assert!(young.is_empty());
}

#[test]
fn test_pool_collects_records_in_session_order() {
    let sessions: Vec<PathBuf> = (0..6)
        .rev()
        .map(|i| PathBuf::from(format!("/data/Session160805264843{}", i)))
        .collect();

    let report = run_pool(sessions, 3, Duration::from_secs(5), |dir: &Path| {
        Ok(stub_record(dir))
    });

    let ids: Vec<_> = report.records.iter().map(|r| r.session_id.clone()).collect();
    assert_eq!(ids.len(), 6);
    assert_eq!(ids[0], "Session1608052648430");
    assert_eq!(ids[5], "Session1608052648435");
    assert!(report.failures.is_empty());
}

#[test]
fn test_pool_reports_timeouts_and_keeps_going() {
    // Scenario: one session hangs past the per-session timeout
    // Expected: it is reported as timed out; the others complete
    let sessions = vec![
        PathBuf::from("/data/Session1608052648431"),
        PathBuf::from("/data/Session1608052648432"),
        PathBuf::from("/data/Session1608052648433"),
    ];

    let report = run_pool(sessions, 2, Duration::from_millis(200), |dir: &Path| {
        if dir.ends_with("Session1608052648432") {
            std::thread::sleep(Duration::from_secs(2));
        }
        Ok(stub_record(dir))
    });

    assert_eq!(report.records.len(), 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, FailureKind::TimedOut);
    assert!(report.failures[0].session_dir.ends_with("Session1608052648432"));
}

#[test]
fn test_pool_reports_fatal_errors_and_panics() {
    let sessions = vec![
        PathBuf::from("/data/Session1608052648431"),
        PathBuf::from("/data/Session1608052648432"),
        PathBuf::from("/data/Session1608052648433"),
    ];

    let report = run_pool(sessions, 2, Duration::from_secs(5), |dir: &Path| {
        if dir.ends_with("Session1608052648431") {
            return Err(ReconcileError::SessionId(SessionIdError::MissingMarker {
                path: dir.display().to_string(),
            }));
        }
        if dir.ends_with("Session1608052648433") {
            panic!("reader blew up");
        }
        Ok(stub_record(dir))
    });

    let kinds: Vec<_> = report.failures.iter().map(|f| f.kind.clone()).collect();
    assert_eq!(kinds, vec![FailureKind::Fatal, FailureKind::Panicked]);
    assert_eq!(report.records.len(), 1);
}

#[test]
fn test_run_batch_end_to_end() {
    let root = TempDir::new().unwrap();
    make_session(root.path(), "RCS02L", "Session1608052648432");
    make_session(root.path(), "RCS02L", "Session1608052999999");
    let config = ReconcilerConfig {
        data_root: root.path().to_path_buf(),
        workers: 2,
        ..ReconcilerConfig::default()
    };
    let reference = Arc::new(ReferenceTable::new(vec![ReferenceEntry {
        device_id: DEVICE_ID.to_string(),
        patient_id: "RCS02".to_string(),
        side: Some("L".to_string()),
        diagnosis: None,
        gender: None,
        targets: Vec::new(),
    }]));

    let report = run_batch(&config, Some(reference));

    assert!(report.failures.is_empty(), "Unexpected failures: {:?}", report.failures);
    assert_eq!(report.records.len(), 2);
    assert!(report.records.iter().all(|r| r.patient_id == "RCS02"));
    assert!(report.records.iter().all(|r| r.time_domain_streaming == Some(true)));
    assert_eq!(report.records[0].session_id, "Session1608052648432");
}

#[test]
fn test_pool_rejects_records_sharing_a_session_id() {
    // Scenario: two folders resolve to the same session id
    // Expected: neither record is kept; both are reported
    let sessions = vec![
        PathBuf::from("/data/a/Session1608052648431"),
        PathBuf::from("/data/b/Session1608052648431"),
        PathBuf::from("/data/Session1608052648432"),
    ];

    let report = run_pool(sessions, 2, Duration::from_secs(5), |dir: &Path| {
        Ok(stub_record(dir))
    });

    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].session_id, "Session1608052648432");
    assert_eq!(report.failures.len(), 2);
    assert!(report
        .failures
        .iter()
        .all(|f| f.kind == FailureKind::DuplicateSessionId));
}

#[test]
fn test_run_batch_under_root_named_sessions() {
    // Scenario: data root path itself contains "sessions"
    // Expected: ids collide, so the batch reports them instead of writing one row
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("rcs_sessions");
    make_session(&root, "RCS02L", "Session1608052648432");
    make_session(&root, "RCS02L", "Session1608052999999");
    let config = ReconcilerConfig {
        data_root: root,
        workers: 2,
        ..ReconcilerConfig::default()
    };

    let report = run_batch(&config, None);

    assert!(report.records.is_empty());
    let kinds: Vec<_> = report.failures.iter().map(|f| f.kind.clone()).collect();
    assert_eq!(
        kinds,
        vec![FailureKind::DuplicateSessionId, FailureKind::DuplicateSessionId]
    );
}
