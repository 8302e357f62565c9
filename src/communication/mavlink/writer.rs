//! MAVLink Message Writer
//!
//! Serializes outbound messages into MAVLink 2.0 frames using rust-mavlink.
//!
//! # Architecture
//!
//! - Producers on any thread call [`MavlinkWriter::encode`]
//! - The writer stamps the header with our system/component id and the next
//!   sequence number, then returns the frame bytes
//! - Frames go to the outgoing queue; the writer never touches the transport
//!
//! The system id follows the autopilot: a companion computer identifies as
//! a component of the vehicle it is attached to, so the id is updated once
//! the autopilot is discovered.

use std::io::Cursor;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use mavlink::common::MavMessage;
use mavlink::MavHeader;
use thiserror::Error;

/// Largest MAVLink 2.0 frame (signed, 255-byte payload)
pub const MAX_FRAME_SIZE: usize = 280;

/// Writer statistics for monitoring and diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Total messages successfully serialized
    pub messages_sent: u32,
    /// Serialization failures
    pub serialization_errors: u32,
}

/// Writer error types
#[derive(Debug, Error)]
pub enum WriterError {
    #[error("message serialization failed: {0}")]
    Serialization(String),
}

/// MAVLink message writer
///
/// Shared by reference between every producer thread.
#[derive(Debug)]
pub struct MavlinkWriter {
    system_id: AtomicU8,
    component_id: u8,
    sequence: AtomicU8,
    messages_sent: AtomicU32,
    serialization_errors: AtomicU32,
}

impl MavlinkWriter {
    /// Create a new MAVLink writer
    ///
    /// # Arguments
    ///
    /// * `system_id` - MAVLink system ID until the autopilot is known
    /// * `component_id` - MAVLink component ID (191 for an onboard computer)
    pub fn new(system_id: u8, component_id: u8) -> Self {
        Self {
            system_id: AtomicU8::new(system_id),
            component_id,
            sequence: AtomicU8::new(0),
            messages_sent: AtomicU32::new(0),
            serialization_errors: AtomicU32::new(0),
        }
    }

    pub fn system_id(&self) -> u8 {
        self.system_id.load(Ordering::Relaxed)
    }

    pub fn set_system_id(&self, system_id: u8) {
        self.system_id.store(system_id, Ordering::Relaxed);
    }

    pub fn component_id(&self) -> u8 {
        self.component_id
    }

    /// Sequence number the next frame will carry
    pub fn sequence(&self) -> u8 {
        self.sequence.load(Ordering::Relaxed)
    }

    /// Get writer statistics
    pub fn stats(&self) -> WriterStats {
        WriterStats {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            serialization_errors: self.serialization_errors.load(Ordering::Relaxed),
        }
    }

    /// Serialize `message` into a complete MAVLink 2.0 frame
    pub fn encode(&self, message: &MavMessage) -> Result<Vec<u8>, WriterError> {
        let header = MavHeader {
            system_id: self.system_id(),
            component_id: self.component_id,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };

        let mut buf = Cursor::new(Vec::with_capacity(MAX_FRAME_SIZE));
        match mavlink::write_v2_msg(&mut buf, header, message) {
            Ok(_) => {
                self.messages_sent.fetch_add(1, Ordering::Relaxed);
                Ok(buf.into_inner())
            }
            Err(e) => {
                self.serialization_errors.fetch_add(1, Ordering::Relaxed);
                Err(WriterError::Serialization(format!("{e:?}")))
            }
        }
    }
}
