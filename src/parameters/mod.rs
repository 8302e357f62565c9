//! Controller configuration
//!
//! Configuration is a TOML file split into sections, one per concern.
//! Every field has a default, so an empty (or missing) file yields a
//! working controller on a stock companion computer.
//!
//! # Sections
//!
//! - `log_level` - top-level `tracing` filter (default `info`)
//! - `[link]` - MAVLink link address and heartbeat timing ([`LinkParams`])
//! - `[pipeline]` - external program locations and restart policy ([`PipelineParams`])
//! - `[channelizer]` - channelizer geometry ([`ChannelizerParams`])
//! - `[detector]` - detector config file defaults ([`DetectorParams`])
//! - `[telemetry]` - telemetry sampling and retention ([`TelemetryParams`])
//! - `[pulse]` - detector pulse ingress ([`PulseParams`])
//! - `[simulator]` - simulated pulse generator ([`SimulatorParams`])
//!
//! # Example
//!
//! ```toml
//! [link]
//! url = "serial:/dev/ttyAMA0:921600"
//!
//! [pipeline]
//! max_restarts = 2
//! ```

pub mod detector;
pub mod link;
pub mod pipeline;
pub mod telemetry;

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub use detector::{ChannelizerParams, DetectorParams};
pub use link::LinkParams;
pub use pipeline::PipelineParams;
pub use telemetry::{PulseParams, SimulatorParams, TelemetryParams};

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Complete controller configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    /// `tracing` filter directive; `RUST_LOG` and `--log-level` take precedence
    pub log_level: Option<String>,
    pub link: LinkParams,
    pub pipeline: PipelineParams,
    pub channelizer: ChannelizerParams,
    pub detector: DetectorParams,
    pub telemetry: TelemetryParams,
    pub pulse: PulseParams,
    pub simulator: SimulatorParams,
}

impl ControllerConfig {
    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        crate::log_info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.link.validate()?;
        self.channelizer.validate()?;
        self.telemetry.validate()?;
        self.pulse.validate()?;
        self.simulator.validate()?;
        Ok(())
    }
}
