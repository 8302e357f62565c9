//! `[telemetry]`, `[pulse]` and `[simulator]` sections

use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;

use super::ConfigError;

/// Telemetry sampling parameters
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryParams {
    pub sample_interval_ms: u64,
    /// Lower bound of the history kept for pulse lookups (s)
    pub retention_floor_seconds: f64,
}

impl Default for TelemetryParams {
    fn default() -> Self {
        Self {
            sample_interval_ms: 1000,
            retention_floor_seconds: 30.0,
        }
    }
}

impl TelemetryParams {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "telemetry.sample_interval_ms",
                reason: "must be non-zero".to_string(),
            });
        }
        if self.retention_floor_seconds.is_nan() || self.retention_floor_seconds < 0.0 {
            return Err(ConfigError::Invalid {
                field: "telemetry.retention_floor_seconds",
                reason: "must be a non-negative number".to_string(),
            });
        }
        Ok(())
    }
}

/// Detector pulse ingress
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PulseParams {
    pub listen: String,
}

impl Default for PulseParams {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:30000".to_string(),
        }
    }
}

impl PulseParams {
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen.parse().map_err(|_| ConfigError::Invalid {
            field: "pulse.listen",
            reason: format!("'{}' is not a socket address", self.listen),
        })
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr().map(|_| ())
    }
}

/// Simulated pulse generator
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulatorParams {
    pub enabled: bool,
    /// Heading of peak antenna gain relative to the vehicle nose (deg)
    pub antenna_offset_degrees: f64,
    pub intra_pulse_seconds: f64,
    pub k: u32,
}

impl Default for SimulatorParams {
    fn default() -> Self {
        Self {
            enabled: false,
            antenna_offset_degrees: 0.0,
            intra_pulse_seconds: 2.0,
            k: 3,
        }
    }
}

impl SimulatorParams {
    /// Time between simulated pulse groups
    pub fn group_period(&self) -> Duration {
        Duration::from_secs_f64(self.intra_pulse_seconds * f64::from(self.k + 1))
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.intra_pulse_seconds.is_nan() || self.intra_pulse_seconds <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "simulator.intra_pulse_seconds",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}
