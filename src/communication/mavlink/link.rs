//! Outbound half of a MAVLink connection
//!
//! Bundles the writer, the outgoing queue and the peer tracker so producers
//! on any thread can address and send a message with one call. Cloned as
//! `Arc<MavlinkLink>` into the status notifier, the tunnel sender and the
//! heartbeat threads.

use std::sync::Arc;

use mavlink::common::MavMessage;

use super::outgoing_queue::OutgoingMessageQueue;
use super::state::PeerTracker;
use super::writer::MavlinkWriter;

/// Shared outbound path
pub struct MavlinkLink {
    writer: MavlinkWriter,
    queue: OutgoingMessageQueue,
    peers: Arc<PeerTracker>,
}

impl MavlinkLink {
    pub fn new(writer: MavlinkWriter, queue: OutgoingMessageQueue, peers: Arc<PeerTracker>) -> Self {
        Self {
            writer,
            queue,
            peers,
        }
    }

    pub fn peers(&self) -> &Arc<PeerTracker> {
        &self.peers
    }

    pub fn writer(&self) -> &MavlinkWriter {
        &self.writer
    }

    pub fn queue(&self) -> &OutgoingMessageQueue {
        &self.queue
    }

    /// Ground station system id, once a GCS heartbeat has been seen
    pub fn gcs_system_id(&self) -> Option<u8> {
        self.peers.gcs_system_id()
    }

    /// Serialize and queue `message`; returns false if it was not queued
    pub fn send(&self, message: &MavMessage) -> bool {
        match self.writer.encode(message) {
            Ok(frame) => self.queue.enqueue(frame),
            Err(e) => {
                crate::log_error!("{}", e);
                false
            }
        }
    }

    /// Flush queued frames and stop the sender thread
    pub fn shutdown(&self) {
        self.queue.shutdown();
    }
}
