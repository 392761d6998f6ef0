use tempfile::TempDir;

use crate::reference::{ReferenceError, ReferenceTable};

use super::test_helpers::write_file;

const TABLE: &str = r#"[
    {"deviceId": "NPC700378H", "patientId": "RCS02", "side": "L", "targets": ["STN"]},
    {"deviceId": "NPC700403H", "patientId": "RCS05", "side": "LR", "diagnosis": "PD"},
    {"deviceId": "NPC700403H", "patientId": "RCS06"}
]"#;

#[test]
fn test_load_reference_table() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "reference.json", TABLE);

    let table = ReferenceTable::load(&path).unwrap();

    assert_eq!(table.len(), 3);
    assert!(!table.is_empty());
}

#[test]
fn test_lookup_exact_match_only() {
    let dir = TempDir::new().unwrap();
    let table = ReferenceTable::load(&write_file(dir.path(), "reference.json", TABLE)).unwrap();

    let entry = table.lookup("NPC700378H").unwrap().unwrap();
    assert_eq!(entry.patient_id, "RCS02");
    assert_eq!(entry.targets, vec!["STN"]);

    assert!(table.lookup("npc700378h").unwrap().is_none());
    assert!(table.lookup("NPC700378").unwrap().is_none());
}

#[test]
fn test_lookup_multiple_matches_is_an_error() {
    let dir = TempDir::new().unwrap();
    let table = ReferenceTable::load(&write_file(dir.path(), "reference.json", TABLE)).unwrap();

    let result = table.lookup("NPC700403H");

    assert!(matches!(
        result,
        Err(ReferenceError::AmbiguousMatch { count: 2, .. })
    ));
}

#[test]
fn test_load_malformed_table() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "reference.json", r#"[{"deviceId": 5}]"#);

    assert!(matches!(
        ReferenceTable::load(&path),
        Err(ReferenceError::Parse { .. })
    ));
    assert!(matches!(
        ReferenceTable::load(&dir.path().join("absent.json")),
        Err(ReferenceError::Io { .. })
    ));
}
