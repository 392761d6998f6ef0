//! DeviceSettings.json: subject metadata plus every settings-change table.

use crate::session::parser::time::{
    change_points_to_intervals, offset_from_hours, parse_utc_offset, RawInterval,
};
use crate::session::{
    AdaptiveSettings, AdaptiveState, DetectorSettings, FftSettings, PowerSettings, SourceKind,
    StimSettings, TimeDomainSettings,
};

use super::stim_log::program_descriptor;
use super::types::{
    AdaptiveConfig, DeviceSettingsRecord, PowerChannel, TherapyConfig, TimeDomainChannel,
    UtcOffsetField,
};
use super::{LogReader, DEVICE_SETTINGS_FILE};

/// States the adaptive controller can be configured with (0 through 8)
pub const MAX_ADAPTIVE_STATES: usize = 9;

const DISABLED_CHANNEL: &str = "disabled";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeadInfo {
    pub location: Option<String>,
    pub target: Option<String>,
}

/// Subject and device facts, taken from the first record that carries each
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubjectMeta {
    pub subject_id: Option<String>,
    pub gender: Option<String>,
    pub diagnosis: Option<String>,
    pub device_id: Option<String>,
    pub utc_offset_hours: Option<f64>,
    pub leads: Vec<LeadInfo>,
}

#[derive(Debug, Clone, Default)]
pub struct DeviceSettingsLog {
    pub meta: SubjectMeta,
    pub time_domain: Vec<RawInterval<TimeDomainSettings>>,
    pub power: Vec<RawInterval<PowerSettings>>,
    pub fft: Vec<RawInterval<FftSettings>>,
    pub stim_settings: Vec<RawInterval<StimSettings>>,
    pub detector: Vec<RawInterval<DetectorSettings>>,
    pub adaptive: Vec<RawInterval<AdaptiveSettings>>,
    pub last_host_time: Option<i64>,
}

pub struct DeviceSettingsReader;

impl LogReader for DeviceSettingsReader {
    type Record = DeviceSettingsRecord;
    type Output = DeviceSettingsLog;

    fn source(&self) -> SourceKind {
        SourceKind::DeviceSettings
    }

    fn file_name(&self) -> &'static str {
        DEVICE_SETTINGS_FILE
    }

    fn build(&self, records: Vec<DeviceSettingsRecord>) -> DeviceSettingsLog {
        let last_host_time = records.iter().rev().find_map(|r| r.host_time());

        let mut meta = SubjectMeta::default();
        let mut time_domain = Vec::new();
        let mut power = Vec::new();
        let mut fft = Vec::new();
        let mut stim_settings = Vec::new();
        let mut detector = Vec::new();
        let mut adaptive = Vec::new();

        for record in records {
            let time = record.host_time();
            fold_meta(&mut meta, &record);

            if let Some(sensing) = record.sensing_config {
                if let Some(channels) = sensing.time_domain_channels {
                    time_domain.push((time, time_domain_settings(&channels)));
                }
                if let Some(channels) = sensing.power_channels {
                    power.push((time, power_settings(&channels)));
                }
                if let Some(cfg) = sensing.fft_config {
                    fft.push((
                        time,
                        FftSettings {
                            size: cfg.size,
                            interval_ms: cfg.interval,
                            window_load: cfg.window_load,
                        },
                    ));
                }
            }
            if let Some(therapy) = record.therapy_config {
                stim_settings.push((time, stim_settings_from(&therapy)));
            }
            if let Some(detection) = record.detection_config {
                detector.push((
                    time,
                    DetectorSettings {
                        ld0: detection.ld0,
                        ld1: detection.ld1,
                    },
                ));
            }
            if let Some(cfg) = record.adaptive_config {
                adaptive.push((time, adaptive_settings_from(cfg)));
            }
        }

        log::debug!(
            "Device settings: {} td, {} power, {} fft, {} stim, {} detector, {} adaptive change(s)",
            time_domain.len(),
            power.len(),
            fft.len(),
            stim_settings.len(),
            detector.len(),
            adaptive.len()
        );

        DeviceSettingsLog {
            meta,
            time_domain: change_points_to_intervals(time_domain, last_host_time),
            power: change_points_to_intervals(power, last_host_time),
            fft: change_points_to_intervals(fft, last_host_time),
            stim_settings: change_points_to_intervals(stim_settings, last_host_time),
            detector: change_points_to_intervals(detector, last_host_time),
            adaptive: change_points_to_intervals(adaptive, last_host_time),
            last_host_time,
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn fold_meta(meta: &mut SubjectMeta, record: &DeviceSettingsRecord) {
    if meta.device_id.is_none() {
        meta.device_id = record
            .record_info
            .as_ref()
            .and_then(|info| non_blank(&info.device_id));
    }
    if meta.utc_offset_hours.is_none() {
        meta.utc_offset_hours = match &record.utc_offset {
            Some(UtcOffsetField::Hours(hours)) => Some(*hours),
            Some(UtcOffsetField::Text(text)) => parse_utc_offset(text),
            None => None,
        }
        .filter(|hours| match offset_from_hours(*hours) {
            Ok(_) => true,
            Err(e) => {
                log::warn!("Ignoring UtcOffset in device settings: {}", e);
                false
            }
        });
    }
    if let Some(subject) = &record.subject_info {
        if meta.subject_id.is_none() {
            meta.subject_id = non_blank(&subject.id);
        }
        if meta.gender.is_none() {
            meta.gender = non_blank(&subject.gender);
        }
        if meta.diagnosis.is_none() {
            meta.diagnosis = non_blank(&subject.diagnosis);
        }
    }
    if let Some(leads) = &record.lead_configuration {
        if meta.leads.is_empty() {
            meta.leads = leads
                .initial
                .iter()
                .map(|lead| LeadInfo {
                    location: lead.lead_location.clone(),
                    target: lead.target_location.clone(),
                })
                .collect();
        }
    }
}

/// Descriptor like "+2-0 lpf1-450Hz lpf2-1700Hz sr-500Hz"
pub fn channel_descriptor(channel: &TimeDomainChannel) -> String {
    if channel.disabled {
        return DISABLED_CHANNEL.to_string();
    }
    let (Some(plus), Some(minus)) = (&channel.plus_input, &channel.minus_input) else {
        return DISABLED_CHANNEL.to_string();
    };

    let mut parts = vec![format!("{}{}", plus.trim(), minus.trim())];
    if let Some(lpf1) = channel.lpf1 {
        parts.push(format!("lpf1-{}Hz", lpf1));
    }
    if let Some(lpf2) = channel.lpf2 {
        parts.push(format!("lpf2-{}Hz", lpf2));
    }
    if let Some(rate) = channel.sample_rate {
        parts.push(format!("sr-{}Hz", rate));
    }
    parts.join(" ")
}

fn time_domain_settings(channels: &[TimeDomainChannel]) -> TimeDomainSettings {
    TimeDomainSettings {
        channels: channels.iter().map(channel_descriptor).collect(),
        sample_rate_hz: channels
            .iter()
            .filter(|c| !c.disabled)
            .find_map(|c| c.sample_rate),
    }
}

fn power_settings(channels: &[PowerChannel]) -> PowerSettings {
    let bands = channels
        .iter()
        .enumerate()
        .filter_map(|(index, ch)| {
            let band = ch.band.as_ref()?;
            let (lo, hi) = (band.first()?, band.get(1)?);
            let channel = ch.channel.map(usize::from).unwrap_or(index);
            Some(format!("{}:{}-{}Hz", channel, lo, hi))
        })
        .collect();
    PowerSettings { bands }
}

fn stim_settings_from(therapy: &TherapyConfig) -> StimSettings {
    let programs = therapy
        .groups
        .iter()
        .flat_map(|(group, cfg)| {
            cfg.programs.iter().map(move |program| {
                format!(
                    "Group {}: {}",
                    group,
                    program_descriptor(
                        program.electrodes.as_deref(),
                        program.amp_in_milliamps,
                        program.pulse_width_in_microseconds,
                        cfg.rate_in_hz,
                    )
                )
            })
        })
        .collect();

    StimSettings {
        active_group: therapy.active_group.as_ref().and_then(|g| g.label()),
        therapy_on: therapy.therapy_status.map(|status| status == 1),
        programs,
    }
}

fn adaptive_settings_from(cfg: AdaptiveConfig) -> AdaptiveSettings {
    if cfg.states.len() > MAX_ADAPTIVE_STATES {
        log::warn!(
            "Adaptive config lists {} states, keeping the first {}",
            cfg.states.len(),
            MAX_ADAPTIVE_STATES
        );
    }
    AdaptiveSettings {
        adaptive_mode: non_blank(&cfg.adaptive_mode),
        current_state: cfg.current_state,
        states: cfg
            .states
            .iter()
            .take(MAX_ADAPTIVE_STATES)
            .map(|state| AdaptiveState {
                is_valid: state.is_valid,
                amp_milliamps: state.amp_in_milliamps.first().copied(),
            })
            .collect(),
    }
}
