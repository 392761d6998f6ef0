//! Summary fields derived from the most recent row of each settings table.
//!
//! "Most recent" means last in arrival order, not latest timestamp.

use crate::readers::LeadInfo;
use crate::session::model::{
    distinct_currents, AdaptiveSettings, PatientSide, StimLogEntry, TimeDomainSettings, TimedRow,
    NA,
};

/// Sentinel amplitude for an adaptive state with no program configured
pub const UNCONFIGURED_AMP: f64 = -1.0;

/// Lead location written for unimplanted lead slots
const UNDEFINED_LEAD: &str = "Undefined";

/// Legacy cohort IDs carry a trailing hemisphere letter ("RCS02L");
/// six-character IDs are cut back to the patient ("RCS02").
pub fn normalize_patient_id(subject_id: &str) -> String {
    let subject_id = subject_id.trim();
    if subject_id.chars().count() == 6 {
        subject_id.chars().take(5).collect()
    } else {
        subject_id.to_string()
    }
}

pub fn patient_side(leads: &[LeadInfo]) -> Option<PatientSide> {
    let mut left = false;
    let mut right = false;
    for location in leads.iter().filter_map(|lead| lead.location.as_deref()) {
        let location = location.trim();
        if location.eq_ignore_ascii_case(UNDEFINED_LEAD) {
            continue;
        }
        match location.chars().next().map(|c| c.to_ascii_uppercase()) {
            Some('L') => left = true,
            Some('R') => right = true,
            _ => {}
        }
    }
    match (left, right) {
        (true, true) => Some(PatientSide::Both),
        (true, false) => Some(PatientSide::Left),
        (false, true) => Some(PatientSide::Right),
        (false, false) => None,
    }
}

/// Parse a side as written in the reference table: "L", "Right", "LR", "Both"
pub fn parse_side(text: &str) -> Option<PatientSide> {
    match text.trim().to_ascii_uppercase().as_str() {
        "L" | "LEFT" => Some(PatientSide::Left),
        "R" | "RIGHT" => Some(PatientSide::Right),
        "LR" | "RL" | "BOTH" => Some(PatientSide::Both),
        _ => None,
    }
}

pub fn target_areas(leads: &[LeadInfo]) -> Vec<String> {
    leads
        .iter()
        .filter_map(|lead| lead.target.as_deref())
        .map(str::trim)
        .filter(|target| !target.is_empty())
        .map(str::to_string)
        .collect()
}

/// chan1..chan4 from the last sensing row
pub fn channel_snapshot(rows: &[TimedRow<TimeDomainSettings>]) -> [String; 4] {
    let channels = rows
        .last()
        .map(|row| row.settings.channels.as_slice())
        .unwrap_or(&[]);
    std::array::from_fn(|i| channels.get(i).cloned().unwrap_or_else(|| NA.to_string()))
}

/// Fields pulled out of a "E0-E3+C,2.5mA,60us,130.2Hz" program descriptor.
/// Each field degrades to `None` on its own.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgramFields {
    pub electrode_config: Option<String>,
    pub amplitude_milliamps: Option<f64>,
    pub rate_hz: Option<f64>,
}

pub fn parse_program(text: &str) -> ProgramFields {
    let fields: Vec<&str> = text.split(',').map(str::trim).collect();
    ProgramFields {
        electrode_config: fields
            .first()
            .filter(|f| !f.is_empty() && **f != NA)
            .map(|f| f.to_string()),
        amplitude_milliamps: fields.get(1).and_then(|f| strip_unit(f, "mA")),
        rate_hz: fields.get(3).and_then(|f| strip_unit(f, "Hz")),
    }
}

fn strip_unit(field: &str, unit: &str) -> Option<f64> {
    field
        .strip_suffix(unit)
        .unwrap_or(field)
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

#[derive(Debug, Clone, PartialEq)]
pub struct StimSnapshot {
    pub stimulation_on: Option<bool>,
    pub active_group: String,
    pub program: ProgramFields,
    pub full_settings_text: String,
    pub num_changes: usize,
}

/// Stimulation snapshot from the stim log; `None` when the log has no rows
pub fn stim_snapshot(rows: &[TimedRow<StimLogEntry>]) -> Option<StimSnapshot> {
    let last = &rows.last()?.settings;

    let program = last
        .programs
        .first()
        .and_then(|p| p.as_deref())
        .map(parse_program)
        .unwrap_or_default();

    let listed: Vec<&str> = last.programs.iter().flatten().map(String::as_str).collect();
    let full_settings_text = match (&last.active_group, listed.is_empty()) {
        (_, true) => NA.to_string(),
        (Some(group), false) => format!("Group {}: {}", group, listed.join("; ")),
        (None, false) => listed.join("; "),
    };

    Some(StimSnapshot {
        stimulation_on: last.therapy_on,
        active_group: last.active_group.clone().unwrap_or_else(|| NA.to_string()),
        program,
        full_settings_text,
        num_changes: count_distinct(rows.iter().map(|row| &row.settings)),
    })
}

fn count_distinct<'a>(entries: impl Iterator<Item = &'a StimLogEntry>) -> usize {
    let mut seen: Vec<&StimLogEntry> = Vec::new();
    for entry in entries {
        if !seen.contains(&entry) {
            seen.push(entry);
        }
    }
    seen.len()
}

/// Distinct configured target currents across valid adaptive states
pub fn target_adaptive_currents(settings: &AdaptiveSettings) -> Vec<f64> {
    distinct_currents(
        settings
            .states
            .iter()
            .filter(|state| state.is_valid)
            .filter_map(|state| state.amp_milliamps)
            .filter(|amp| amp.is_finite() && (amp - UNCONFIGURED_AMP).abs() > f64::EPSILON),
    )
}
