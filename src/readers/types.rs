//! Typed records for the device's JSON log files.
//!
//! Every field is optional: the device only writes the sections that
//! changed, so a record holding just `RecordInfo` is normal.

use serde::Deserialize;
use std::collections::BTreeMap;

use crate::session::LinearDiscriminant;

/// Record header shared by all log types
#[derive(Deserialize, Default, Debug, Clone)]
pub struct RecordInfo {
    #[serde(rename = "HostUnixTime")]
    pub host_unix_time: Option<i64>,
    #[serde(rename = "DeviceId")]
    pub device_id: Option<String>,
}

/// Offset either as "-07:00" text or as a number of hours
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum UtcOffsetField {
    Hours(f64),
    Text(String),
}

/// Therapy group as an index (0 = A) or a letter
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum GroupField {
    Index(u8),
    Name(String),
}

impl GroupField {
    pub fn label(&self) -> Option<String> {
        match self {
            GroupField::Index(i) if *i < 4 => Some(((b'A' + *i) as char).to_string()),
            GroupField::Index(_) => None,
            GroupField::Name(name) => {
                let name = name.trim().trim_start_matches("Group").trim();
                (!name.is_empty()).then(|| name.to_uppercase())
            }
        }
    }
}

#[derive(Deserialize, Default, Debug, Clone)]
pub struct DeviceSettingsRecord {
    #[serde(rename = "HostUnixTime")]
    pub host_unix_time: Option<i64>,
    #[serde(rename = "RecordInfo")]
    pub record_info: Option<RecordInfo>,
    #[serde(rename = "UtcOffset")]
    pub utc_offset: Option<UtcOffsetField>,
    #[serde(rename = "SubjectInfo")]
    pub subject_info: Option<SubjectInfo>,
    #[serde(rename = "LeadConfiguration")]
    pub lead_configuration: Option<LeadConfiguration>,
    #[serde(rename = "SensingConfig")]
    pub sensing_config: Option<SensingConfig>,
    #[serde(rename = "TherapyConfig")]
    pub therapy_config: Option<TherapyConfig>,
    #[serde(rename = "DetectionConfig")]
    pub detection_config: Option<DetectionConfig>,
    #[serde(rename = "AdaptiveConfig")]
    pub adaptive_config: Option<AdaptiveConfig>,
}

impl DeviceSettingsRecord {
    pub fn host_time(&self) -> Option<i64> {
        self.host_unix_time
            .or_else(|| self.record_info.as_ref().and_then(|r| r.host_unix_time))
    }
}

#[derive(Deserialize, Default, Debug, Clone)]
pub struct SubjectInfo {
    #[serde(rename = "ID")]
    pub id: Option<String>,
    #[serde(rename = "Gender")]
    pub gender: Option<String>,
    #[serde(rename = "Diagnosis")]
    pub diagnosis: Option<String>,
}

#[derive(Deserialize, Default, Debug, Clone)]
pub struct LeadConfiguration {
    #[serde(rename = "Initial", default)]
    pub initial: Vec<LeadRecord>,
}

#[derive(Deserialize, Default, Debug, Clone)]
pub struct LeadRecord {
    #[serde(rename = "LeadLocation")]
    pub lead_location: Option<String>,
    #[serde(rename = "TargetLocation")]
    pub target_location: Option<String>,
}

#[derive(Deserialize, Default, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SensingConfig {
    pub time_domain_channels: Option<Vec<TimeDomainChannel>>,
    pub power_channels: Option<Vec<PowerChannel>>,
    pub fft_config: Option<FftConfig>,
}

#[derive(Deserialize, Default, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TimeDomainChannel {
    pub plus_input: Option<String>,
    pub minus_input: Option<String>,
    pub sample_rate: Option<f64>,
    pub lpf1: Option<f64>,
    pub lpf2: Option<f64>,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Deserialize, Default, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PowerChannel {
    pub channel: Option<u8>,
    pub band: Option<Vec<f64>>,
}

#[derive(Deserialize, Default, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FftConfig {
    pub size: Option<u32>,
    pub interval: Option<u32>,
    pub window_load: Option<String>,
}

#[derive(Deserialize, Default, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TherapyConfig {
    pub active_group: Option<GroupField>,
    pub therapy_status: Option<u8>,
    #[serde(default)]
    pub groups: BTreeMap<String, TherapyGroup>,
}

#[derive(Deserialize, Default, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TherapyGroup {
    pub rate_in_hz: Option<f64>,
    #[serde(default)]
    pub programs: Vec<TherapyProgram>,
}

#[derive(Deserialize, Default, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TherapyProgram {
    pub electrodes: Option<String>,
    pub amp_in_milliamps: Option<f64>,
    pub pulse_width_in_microseconds: Option<f64>,
}

#[derive(Deserialize, Default, Debug, Clone)]
pub struct DetectionConfig {
    #[serde(rename = "Ld0")]
    pub ld0: Option<LinearDiscriminant>,
    #[serde(rename = "Ld1")]
    pub ld1: Option<LinearDiscriminant>,
}

#[derive(Deserialize, Default, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AdaptiveConfig {
    pub adaptive_mode: Option<String>,
    pub current_state: Option<u8>,
    #[serde(default)]
    pub states: Vec<AdaptiveStateConfig>,
}

#[derive(Deserialize, Default, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AdaptiveStateConfig {
    #[serde(default)]
    pub is_valid: bool,
    #[serde(default)]
    pub amp_in_milliamps: Vec<f64>,
}

#[derive(Deserialize, Default, Debug, Clone)]
pub struct StimLogRecord {
    #[serde(rename = "HostUnixTime")]
    pub host_unix_time: Option<i64>,
    #[serde(rename = "RecordInfo")]
    pub record_info: Option<RecordInfo>,
    #[serde(rename = "activeGroup")]
    pub active_group: Option<GroupField>,
    #[serde(rename = "therapyStatus")]
    pub therapy_status: Option<u8>,
    #[serde(rename = "stimParams_prog1")]
    pub prog1: Option<String>,
    #[serde(rename = "stimParams_prog2")]
    pub prog2: Option<String>,
    #[serde(rename = "stimParams_prog3")]
    pub prog3: Option<String>,
    #[serde(rename = "stimParams_prog4")]
    pub prog4: Option<String>,
}

impl StimLogRecord {
    pub fn host_time(&self) -> Option<i64> {
        self.host_unix_time
            .or_else(|| self.record_info.as_ref().and_then(|r| r.host_unix_time))
    }
}

#[derive(Deserialize, Default, Debug, Clone)]
pub struct EventLogRecord {
    #[serde(rename = "HostUnixTime")]
    pub host_unix_time: Option<i64>,
    #[serde(rename = "RecordInfo")]
    pub record_info: Option<RecordInfo>,
    #[serde(rename = "Event")]
    pub event: Option<EventBody>,
}

impl EventLogRecord {
    pub fn host_time(&self) -> Option<i64> {
        self.host_unix_time
            .or_else(|| self.record_info.as_ref().and_then(|r| r.host_unix_time))
    }
}

#[derive(Deserialize, Default, Debug, Clone)]
pub struct EventBody {
    #[serde(rename = "EventType")]
    pub event_type: Option<String>,
    #[serde(rename = "EventSubType")]
    pub event_sub_type: Option<String>,
}
