//! Detector configuration rendering
//!
//! Each detector process reads a plain `key:\tvalue` file. Times are in
//! seconds and frequencies in MHz, matching what the detector expects.

use core::fmt::Write as _;
use std::path::{Path, PathBuf};

use super::tuner::ChannelPlan;
use super::TagInfo;

/// Settings shared by every detector instance
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    /// Channel sample rate seen by the detector (Fs)
    pub sample_rate_hz: u32,
    pub op_mode: String,
    pub data_ip: String,
    pub control_ip: String,
    pub base_data_port: u16,
    pub base_control_port: u16,
    pub data_record_dir: PathBuf,
    pub processed_output_dir: PathBuf,
    pub ros2_enable: bool,
    pub start_in_run_state: bool,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            sample_rate_hz: 3750,
            op_mode: "freqSearchHardLock".to_string(),
            data_ip: "127.0.0.1".to_string(),
            control_ip: "127.0.0.1".to_string(),
            base_data_port: 20_000,
            base_control_port: 31_000,
            data_record_dir: PathBuf::from("."),
            processed_output_dir: PathBuf::from("."),
            ros2_enable: false,
            start_in_run_state: true,
        }
    }
}

/// Fully resolved configuration of one detector instance
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    /// Detector id: tag id, +1 for the secondary channel
    pub id: u32,
    pub secondary: bool,
    pub channel_bin: u32,
    pub channel_center_freq_mhz: f64,
    pub tag_freq_mhz: f64,
    pub port_data: u16,
    pub port_control: u16,
    /// Pulse width (s)
    pub tp: f64,
    /// Intra-pulse interval (s)
    pub tip: f64,
    /// Intra-pulse uncertainty (s)
    pub tipu: f64,
    /// Intra-pulse jitter (s)
    pub tipj: f64,
    pub k: u32,
    pub false_alarm_prob: f64,
    pub data_record_path: PathBuf,
    pub timestamp: f64,
    settings: DetectorSettings,
}

/// Detector id for a tag channel
pub fn detector_id(tag_id: u32, secondary: bool) -> u32 {
    tag_id + u32::from(secondary)
}

/// Config file name for a detector id
pub fn config_file_name(detector_id: u32) -> String {
    format!("detector.{detector_id}.config")
}

/// Port offset of a channel: two ports per bin, odd for the secondary
pub fn port_offset(one_based_bin: u32, secondary: bool) -> u16 {
    (one_based_bin.saturating_sub(1) * 2 + u32::from(secondary)) as u16
}

fn msecs_to_secs(msecs: u32) -> f64 {
    msecs as f64 / 1000.0
}

impl DetectorConfig {
    pub fn new(
        tag: &TagInfo,
        secondary: bool,
        plan: &ChannelPlan,
        settings: &DetectorSettings,
        timestamp: f64,
    ) -> Self {
        let id = detector_id(tag.id, secondary);
        let offset = port_offset(tag.channel_bin, secondary);
        let tip_msecs = if secondary {
            tag.intra_pulse2_msecs
        } else {
            tag.intra_pulse1_msecs
        };

        Self {
            id,
            secondary,
            channel_bin: tag.channel_bin,
            channel_center_freq_mhz: plan.channel_center_hz(tag.channel_bin) as f64 / 1e6,
            tag_freq_mhz: tag.frequency_hz as f64 / 1e6,
            port_data: settings.base_data_port.wrapping_add(offset),
            port_control: settings.base_control_port.wrapping_add(offset),
            tp: msecs_to_secs(tag.pulse_width_msecs),
            tip: msecs_to_secs(tip_msecs),
            tipu: msecs_to_secs(tag.intra_pulse_uncertainty_msecs),
            tipj: msecs_to_secs(tag.intra_pulse_jitter_msecs),
            k: tag.k,
            false_alarm_prob: tag.false_alarm_probability,
            data_record_path: settings.data_record_dir.join(format!("data_record.{id}.bin")),
            timestamp,
            settings: settings.clone(),
        }
    }

    pub fn file_name(&self) -> String {
        config_file_name(self.id)
    }

    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(self.file_name())
    }

    /// Render the `key:\tvalue` file contents
    pub fn render(&self) -> String {
        let s = &self.settings;
        let mut out = String::new();
        let lines: [(&str, String); 21] = [
            ("ID", self.id.to_string()),
            ("channelCenterFreqMHz", format!("{:.6}", self.channel_center_freq_mhz)),
            ("ipData", s.data_ip.clone()),
            ("portData", self.port_data.to_string()),
            ("Fs", s.sample_rate_hz.to_string()),
            ("tagFreqMHz", format!("{:.6}", self.tag_freq_mhz)),
            ("tp", format!("{:.6}", self.tp)),
            ("tip", format!("{:.6}", self.tip)),
            ("tipu", format!("{:.6}", self.tipu)),
            ("tipj", format!("{:.6}", self.tipj)),
            ("K", self.k.to_string()),
            ("opMode", s.op_mode.clone()),
            ("excldFreqs", "[Inf, -Inf]".to_string()),
            ("falseAlarmProb", self.false_alarm_prob.to_string()),
            ("dataRecordPath", self.data_record_path.display().to_string()),
            ("ipCntrl", s.control_ip.clone()),
            ("portCntrl", self.port_control.to_string()),
            ("processedOutputPath", s.processed_output_dir.display().to_string()),
            ("ros2enable", s.ros2_enable.to_string()),
            ("startInRunState", s.start_in_run_state.to_string()),
            ("timeStamp", format!("{:.3}", self.timestamp)),
        ];

        out.push_str("##################################################\n");
        for (key, value) in lines {
            let _ = writeln!(out, "{key}:\t{value}");
        }
        out
    }
}
