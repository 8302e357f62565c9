//! Peer discovery state
//!
//! Tracks which autopilot and ground station are on the link, based on the
//! heartbeats seen by the receive loop.
//!
//! # Discovery rules
//!
//! - **Autopilot**: first heartbeat from component `MAV_COMP_ID_AUTOPILOT1`
//!   fixes the autopilot system id; later heartbeats from that system refresh
//!   liveness
//! - **Ground station**: first heartbeat whose type is `MAV_TYPE_GCS` from any
//!   other component fixes the GCS system id
//! - **Heartbeat loss**: no autopilot heartbeat for the timeout window sets
//!   the lost flag until the next one arrives
//!
//! # Thread Safety
//!
//! The receive loop is the only writer. Other threads read snapshots through
//! [`PeerTracker`] to address outbound messages.

use std::sync::RwLock;

use mavlink::common::{MavType, HEARTBEAT_DATA};
use mavlink::MavHeader;

/// Component id of the primary autopilot (`MAV_COMP_ID_AUTOPILOT1`)
pub const AUTOPILOT_COMPONENT_ID: u8 = 1;

/// Discovery and liveness of the link's peers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionPeerState {
    pub autopilot_found: bool,
    pub autopilot_system_id: u8,
    pub gcs_found: bool,
    pub gcs_system_id: u8,
    pub last_autopilot_heartbeat_ms: u64,
    pub last_gcs_heartbeat_ms: u64,
    pub heartbeats_lost: bool,
}

/// Discovery transitions worth reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerEvent {
    AutopilotFound(u8),
    GcsFound(u8),
    HeartbeatsLost,
    HeartbeatsRegained,
}

impl ConnectionPeerState {
    /// Apply one received heartbeat
    pub fn on_heartbeat(
        &mut self,
        header: &MavHeader,
        heartbeat: &HEARTBEAT_DATA,
        now_ms: u64,
    ) -> Option<PeerEvent> {
        if header.component_id == AUTOPILOT_COMPONENT_ID {
            if !self.autopilot_found {
                self.autopilot_found = true;
                self.autopilot_system_id = header.system_id;
                self.last_autopilot_heartbeat_ms = now_ms;
                return Some(PeerEvent::AutopilotFound(header.system_id));
            }
            if header.system_id == self.autopilot_system_id {
                self.last_autopilot_heartbeat_ms = now_ms;
                if self.heartbeats_lost {
                    self.heartbeats_lost = false;
                    return Some(PeerEvent::HeartbeatsRegained);
                }
            }
            return None;
        }

        if heartbeat.mavtype == MavType::MAV_TYPE_GCS {
            if !self.gcs_found {
                self.gcs_found = true;
                self.gcs_system_id = header.system_id;
                self.last_gcs_heartbeat_ms = now_ms;
                return Some(PeerEvent::GcsFound(header.system_id));
            }
            if header.system_id == self.gcs_system_id {
                self.last_gcs_heartbeat_ms = now_ms;
            }
        }
        None
    }

    /// Flag heartbeat loss when the autopilot has been silent for `timeout_ms`
    pub fn check_lost(&mut self, now_ms: u64, timeout_ms: u64) -> Option<PeerEvent> {
        if self.autopilot_found
            && !self.heartbeats_lost
            && now_ms.saturating_sub(self.last_autopilot_heartbeat_ms) > timeout_ms
        {
            self.heartbeats_lost = true;
            return Some(PeerEvent::HeartbeatsLost);
        }
        None
    }
}

/// Shared handle on the peer state
#[derive(Debug, Default)]
pub struct PeerTracker {
    state: RwLock<ConnectionPeerState>,
}

impl PeerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ConnectionPeerState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn autopilot_system_id(&self) -> Option<u8> {
        let state = self.snapshot();
        state.autopilot_found.then_some(state.autopilot_system_id)
    }

    pub fn gcs_system_id(&self) -> Option<u8> {
        let state = self.snapshot();
        state.gcs_found.then_some(state.gcs_system_id)
    }

    pub fn on_heartbeat(
        &self,
        header: &MavHeader,
        heartbeat: &HEARTBEAT_DATA,
        now_ms: u64,
    ) -> Option<PeerEvent> {
        self.state
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .on_heartbeat(header, heartbeat, now_ms)
    }

    pub fn check_lost(&self, now_ms: u64, timeout_ms: u64) -> Option<PeerEvent> {
        self.state
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .check_lost(now_ms, timeout_ms)
    }
}
