//! `[channelizer]` and `[detector]` sections

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tag_controller_core::tags::{ChannelizerTuner, DetectorSettings};

use super::ConfigError;

/// Channelizer geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelizerParams {
    pub sample_rate_hz: u32,
    pub channels: u32,
}

impl Default for ChannelizerParams {
    fn default() -> Self {
        Self {
            sample_rate_hz: 375_000,
            channels: 100,
        }
    }
}

impl ChannelizerParams {
    pub fn tuner(&self) -> ChannelizerTuner {
        ChannelizerTuner::new(self.sample_rate_hz, self.channels)
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.channels == 0 || self.sample_rate_hz < self.channels {
            return Err(ConfigError::Invalid {
                field: "channelizer",
                reason: format!(
                    "{} Hz cannot be split into {} channels",
                    self.sample_rate_hz, self.channels
                ),
            });
        }
        Ok(())
    }
}

/// Detector configuration defaults
///
/// Values the TAG record does not carry come from here.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectorParams {
    /// Where `detector.<id>.config` files are written; home when unset
    pub config_dir: Option<PathBuf>,
    pub sample_rate_hz: u32,
    pub k: u32,
    pub false_alarm_probability: f64,
    pub op_mode: String,
    pub data_ip: String,
    pub control_ip: String,
    pub base_data_port: u16,
    pub base_control_port: u16,
    pub ros2_enable: bool,
    pub start_in_run_state: bool,
}

impl Default for DetectorParams {
    fn default() -> Self {
        let settings = DetectorSettings::default();
        Self {
            config_dir: None,
            sample_rate_hz: settings.sample_rate_hz,
            k: 3,
            false_alarm_probability: 0.05,
            op_mode: settings.op_mode,
            data_ip: settings.data_ip,
            control_ip: settings.control_ip,
            base_data_port: settings.base_data_port,
            base_control_port: settings.base_control_port,
            ros2_enable: settings.ros2_enable,
            start_in_run_state: settings.start_in_run_state,
        }
    }
}

impl DetectorParams {
    pub fn config_dir(&self, home: &Path) -> PathBuf {
        self.config_dir.clone().unwrap_or_else(|| home.to_path_buf())
    }

    /// Settings for rendering config files; records and outputs go to `home`
    pub fn settings(&self, home: &Path) -> DetectorSettings {
        DetectorSettings {
            sample_rate_hz: self.sample_rate_hz,
            op_mode: self.op_mode.clone(),
            data_ip: self.data_ip.clone(),
            control_ip: self.control_ip.clone(),
            base_data_port: self.base_data_port,
            base_control_port: self.base_control_port,
            data_record_dir: home.to_path_buf(),
            processed_output_dir: home.to_path_buf(),
            ros2_enable: self.ros2_enable,
            start_in_run_state: self.start_in_run_state,
        }
    }
}
