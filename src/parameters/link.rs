//! `[link]` section

use std::time::Duration;

use serde::Deserialize;

use super::ConfigError;
use crate::communication::mavlink::connection::ConnectionConfig;
use crate::communication::mavlink::transport::LinkAddress;

/// MAVLink link parameters
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkParams {
    /// `udp:<bind>`, `udpout:<remote>` or `serial:<path>:<baud>`
    pub url: String,
    pub heartbeat_interval_ms: u64,
    /// Autopilot heartbeat silence before it is reported lost
    pub heartbeat_timeout_ms: u64,
}

impl Default for LinkParams {
    fn default() -> Self {
        Self {
            url: "udp:0.0.0.0:14540".to_string(),
            heartbeat_interval_ms: 1000,
            heartbeat_timeout_ms: 3000,
        }
    }
}

impl LinkParams {
    pub fn address(&self) -> Result<LinkAddress, ConfigError> {
        self.url.parse().map_err(|e| ConfigError::Invalid {
            field: "link.url",
            reason: format!("{e}"),
        })
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            heartbeat_timeout: Duration::from_millis(self.heartbeat_timeout_ms),
        }
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        self.address()?;
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "link.heartbeat_interval_ms",
                reason: "must be non-zero".to_string(),
            });
        }
        if self.heartbeat_timeout_ms <= self.heartbeat_interval_ms {
            return Err(ConfigError::Invalid {
                field: "link.heartbeat_timeout_ms",
                reason: "must exceed the heartbeat interval".to_string(),
            });
        }
        Ok(())
    }
}
