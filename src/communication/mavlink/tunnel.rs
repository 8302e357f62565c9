//! Tunnel protocol transport
//!
//! Wraps tunnel command records in MAVLink TUNNEL messages addressed to the
//! ground station. Records are encoded by `tag_controller_core::tunnel`;
//! this module only handles the envelope and addressing.

use std::sync::Arc;

use mavlink::common::{MavMessage, MavTunnelPayloadType, TUNNEL_DATA};
use tag_controller_core::tunnel::{
    AckInfo, CommandResult, HeartbeatInfo, PulseInfo, HEARTBEAT_SYSTEM_CONTROLLER,
    TUNNEL_PAYLOAD_CAPACITY,
};

use super::link::MavlinkLink;

/// Sends tunnel records to the ground station
#[derive(Clone)]
pub struct TunnelSender {
    link: Arc<MavlinkLink>,
}

impl TunnelSender {
    pub fn new(link: Arc<MavlinkLink>) -> Self {
        Self { link }
    }

    pub fn link(&self) -> &Arc<MavlinkLink> {
        &self.link
    }

    /// Send one encoded record; false when it could not be sent
    pub fn send_payload(&self, payload: &[u8]) -> bool {
        if payload.len() > TUNNEL_PAYLOAD_CAPACITY {
            crate::log_error!(
                "Tunnel payload of {} bytes exceeds {} byte capacity",
                payload.len(),
                TUNNEL_PAYLOAD_CAPACITY
            );
            return false;
        }
        let Some(gcs) = self.link.gcs_system_id() else {
            crate::log_debug!("No ground station yet, tunnel message not sent");
            return false;
        };

        let mut data = [0u8; TUNNEL_PAYLOAD_CAPACITY];
        data[..payload.len()].copy_from_slice(payload);

        let tunnel = TUNNEL_DATA {
            payload_type: MavTunnelPayloadType::MAV_TUNNEL_PAYLOAD_TYPE_UNKNOWN,
            target_system: gcs,
            target_component: 0,
            payload_length: payload.len() as u8,
            payload: data.into(),
        };
        self.link.send(&MavMessage::TUNNEL(tunnel))
    }

    /// Acknowledge a command
    pub fn send_ack(&self, command: u32, success: bool, message: &str) -> bool {
        let ack = AckInfo {
            command,
            result: CommandResult::from_success(success),
            message: message.to_string(),
        };
        self.send_payload(&ack.encode())
    }

    /// Tunnel-level liveness for the ground station
    pub fn send_heartbeat(&self) -> bool {
        let heartbeat = HeartbeatInfo {
            system_id: HEARTBEAT_SYSTEM_CONTROLLER,
        };
        self.send_payload(&heartbeat.encode())
    }

    pub fn send_pulse(&self, pulse: &PulseInfo) -> bool {
        self.send_payload(&pulse.encode())
    }
}

/// Extract the record carried by a TUNNEL message
pub fn tunnel_payload(tunnel: &TUNNEL_DATA) -> &[u8] {
    let len = (tunnel.payload_length as usize).min(TUNNEL_PAYLOAD_CAPACITY);
    &tunnel.payload[..len]
}
