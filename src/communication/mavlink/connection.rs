//! MAVLink connection
//!
//! Owns the transport and turns it into discovered, live peers.
//!
//! # Threads
//!
//! - **Receive loop**: reads up to one buffer at a time, feeds the
//!   connection's own [`MessageFramer`], updates peer discovery from
//!   heartbeats and hands every decoded message to the dispatcher
//! - **Heartbeat loop**: once per interval checks for autopilot heartbeat
//!   loss, sends our own HEARTBEAT once the autopilot is known and a tunnel
//!   HEARTBEAT once the ground station is known
//! - **Sender**: owned by the outgoing queue inside [`MavlinkLink`]
//!
//! Read and parse errors are logged and the loop continues. `stop()` closes
//! the transport to unblock a pending read, then joins both loops.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use mavlink::common::{MavAutopilot, MavMessage, MavModeFlag, MavState, MavType, HEARTBEAT_DATA};
use mavlink::MavHeader;
use tag_controller_core::traits::{SystemClock, TimeSource};

use super::dispatcher::MessageDispatcher;
use super::link::MavlinkLink;
use super::outgoing_queue::OutgoingMessageQueue;
use super::parser::MessageFramer;
use super::state::{PeerEvent, PeerTracker};
use super::transport::{self, LinkAddress, MavlinkTransport, TransportError, READ_BUFFER_SIZE};
use super::tunnel::TunnelSender;
use super::writer::MavlinkWriter;

/// Component id of a companion computer (`MAV_COMP_ID_ONBOARD_COMPUTER`)
pub const ONBOARD_COMPUTER_COMPONENT_ID: u8 = 191;

/// Connection timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(1000),
            heartbeat_timeout: Duration::from_millis(3000),
        }
    }
}

/// A running MAVLink connection
pub struct Connection {
    transport: Arc<dyn MavlinkTransport>,
    link: Arc<MavlinkLink>,
    dispatcher: Arc<MessageDispatcher>,
    custom_mode: Arc<AtomicU32>,
    running: Arc<AtomicBool>,
    stop_tx: Mutex<Option<Sender<()>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Connection {
    /// Open `address` and start the receive and heartbeat loops
    pub fn start(
        address: &LinkAddress,
        config: ConnectionConfig,
        dispatcher: Arc<MessageDispatcher>,
    ) -> Result<Self, TransportError> {
        let transport = transport::open(address)?;
        crate::log_info!("MAVLink connection on {}", transport.describe());
        Self::start_with_transport(transport, config, dispatcher)
    }

    /// Start on an already opened transport
    pub fn start_with_transport(
        transport: Arc<dyn MavlinkTransport>,
        config: ConnectionConfig,
        dispatcher: Arc<MessageDispatcher>,
    ) -> Result<Self, TransportError> {
        let peers = Arc::new(PeerTracker::new());
        let queue = OutgoingMessageQueue::start(transport.clone())?;
        let writer = MavlinkWriter::new(1, ONBOARD_COMPUTER_COMPONENT_ID);
        let link = Arc::new(MavlinkLink::new(writer, queue, peers));

        let running = Arc::new(AtomicBool::new(true));
        let custom_mode = Arc::new(AtomicU32::new(0));
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);

        let receive = {
            let transport = transport.clone();
            let link = link.clone();
            let dispatcher = dispatcher.clone();
            let running = running.clone();
            std::thread::Builder::new()
                .name("mavlink-receive".into())
                .spawn(move || receive_loop(transport, link, dispatcher, running))?
        };

        let heartbeat = {
            let link = link.clone();
            let custom_mode = custom_mode.clone();
            std::thread::Builder::new()
                .name("mavlink-heartbeat".into())
                .spawn(move || heartbeat_loop(link, custom_mode, config, stop_rx))?
        };

        Ok(Self {
            transport,
            link,
            dispatcher,
            custom_mode,
            running,
            stop_tx: Mutex::new(Some(stop_tx)),
            threads: Mutex::new(vec![receive, heartbeat]),
        })
    }

    pub fn link(&self) -> &Arc<MavlinkLink> {
        &self.link
    }

    pub fn dispatcher(&self) -> &Arc<MessageDispatcher> {
        &self.dispatcher
    }

    /// Shared value reported in our HEARTBEAT `custom_mode`
    pub fn custom_mode(&self) -> Arc<AtomicU32> {
        self.custom_mode.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop both loops, flush the outgoing queue and close the transport
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        // Dropping the sender wakes the heartbeat loop immediately
        drop(self.stop_tx.lock().unwrap_or_else(|e| e.into_inner()).take());

        let threads = std::mem::take(&mut *self.threads.lock().unwrap_or_else(|e| e.into_inner()));
        self.transport.close();
        for handle in threads {
            if handle.join().is_err() {
                crate::log_error!("MAVLink connection thread panicked");
            }
        }
        self.link.shutdown();
        crate::log_info!("MAVLink connection stopped");
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.stop();
    }
}

fn receive_loop(
    transport: Arc<dyn MavlinkTransport>,
    link: Arc<MavlinkLink>,
    dispatcher: Arc<MessageDispatcher>,
    running: Arc<AtomicBool>,
) {
    crate::log_debug!("Receive loop started");
    let clock = SystemClock;
    let mut framer = MessageFramer::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    while running.load(Ordering::Acquire) {
        let n = match transport.read(&mut buf) {
            Ok(n) => n,
            Err(TransportError::Closed) => break,
            Err(e) => {
                crate::log_warn!("MAVLink read error: {}", e);
                std::thread::sleep(Duration::from_millis(100));
                continue;
            }
        };
        if n == 0 {
            continue;
        }

        for (header, message) in framer.push(&buf[..n]) {
            if let MavMessage::HEARTBEAT(heartbeat) = &message {
                handle_heartbeat(&link, &header, heartbeat, clock.now_ms());
            }
            dispatcher.dispatch(&header, &message);
        }
    }

    let stats = framer.stats();
    crate::log_debug!(
        "Receive loop exiting: {} messages, {} parse errors",
        stats.messages_received,
        stats.parse_errors
    );
}

fn handle_heartbeat(link: &MavlinkLink, header: &MavHeader, heartbeat: &HEARTBEAT_DATA, now_ms: u64) {
    match link.peers().on_heartbeat(header, heartbeat, now_ms) {
        Some(PeerEvent::AutopilotFound(system_id)) => {
            crate::log_info!("Found autopilot - sysid: {}", system_id);
            link.writer().set_system_id(system_id);
        }
        Some(PeerEvent::GcsFound(system_id)) => {
            crate::log_info!("Found gcs - sysid: {}", system_id);
        }
        Some(PeerEvent::HeartbeatsRegained) => {
            crate::log_info!("Heartbeats regained from autopilot");
        }
        Some(PeerEvent::HeartbeatsLost) | None => {}
    }
}

/// Our own HEARTBEAT as an onboard controller
pub fn own_heartbeat(custom_mode: u32) -> MavMessage {
    MavMessage::HEARTBEAT(HEARTBEAT_DATA {
        custom_mode,
        mavtype: MavType::MAV_TYPE_ONBOARD_CONTROLLER,
        autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
        base_mode: MavModeFlag::empty(),
        system_status: MavState::MAV_STATE_ACTIVE,
        mavlink_version: 3,
    })
}

fn heartbeat_loop(
    link: Arc<MavlinkLink>,
    custom_mode: Arc<AtomicU32>,
    config: ConnectionConfig,
    stop_rx: Receiver<()>,
) {
    let clock = SystemClock;
    let tunnel = TunnelSender::new(link.clone());
    let timeout_ms = config.heartbeat_timeout.as_millis() as u64;

    loop {
        match stop_rx.recv_timeout(config.heartbeat_interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        if link.peers().check_lost(clock.now_ms(), timeout_ms) == Some(PeerEvent::HeartbeatsLost) {
            crate::log_warn!("Heartbeats lost from autopilot");
        }

        // No recipient until the autopilot is known
        if link.peers().autopilot_system_id().is_some() {
            link.send(&own_heartbeat(custom_mode.load(Ordering::Relaxed)));
        }
        if link.gcs_system_id().is_some() {
            tunnel.send_heartbeat();
        }
    }
    crate::log_debug!("Heartbeat loop exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::mavlink::transport::mock::MockTransport;
    use mavlink::common::ATTITUDE_DATA;
    use std::io::Cursor;
    use std::sync::atomic::AtomicU32;
    use std::time::Instant;

    fn frame(system_id: u8, component_id: u8, msg: &MavMessage) -> Vec<u8> {
        let header = MavHeader {
            system_id,
            component_id,
            sequence: 0,
        };
        let mut buf = Cursor::new(Vec::new());
        mavlink::write_v2_msg(&mut buf, header, msg).unwrap();
        buf.into_inner()
    }

    fn heartbeat(mavtype: MavType) -> MavMessage {
        MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            mavtype,
            ..HEARTBEAT_DATA::default()
        })
    }

    fn fast_config() -> ConnectionConfig {
        ConnectionConfig {
            heartbeat_interval: Duration::from_millis(20),
            heartbeat_timeout: Duration::from_millis(3000),
        }
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_discovery_and_dispatch() {
        let transport = Arc::new(MockTransport::new());
        let dispatcher = Arc::new(MessageDispatcher::new());
        let attitudes = Arc::new(AtomicU32::new(0));
        let counter = attitudes.clone();
        dispatcher.subscribe(30, move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let connection =
            Connection::start_with_transport(transport.clone(), fast_config(), dispatcher).unwrap();

        // Split the autopilot heartbeat across two reads
        let autopilot = frame(7, 1, &heartbeat(MavType::MAV_TYPE_QUADROTOR));
        transport.push_read(&autopilot[..5]);
        transport.push_read(&autopilot[5..]);
        transport.push_read(&frame(255, 190, &heartbeat(MavType::MAV_TYPE_GCS)));
        transport.push_read(&frame(7, 1, &MavMessage::ATTITUDE(ATTITUDE_DATA::default())));

        assert!(wait_until(|| attitudes.load(Ordering::SeqCst) == 1));
        let peers = connection.link().peers();
        assert_eq!(peers.autopilot_system_id(), Some(7));
        assert_eq!(peers.gcs_system_id(), Some(255));
        assert_eq!(connection.link().writer().system_id(), 7);

        connection.custom_mode().store(3, Ordering::SeqCst);
        // Wait for at least one own heartbeat carrying the mode
        assert!(wait_until(|| {
            let mut framer = MessageFramer::new();
            transport.written().iter().flat_map(|f| framer.push(f)).any(|(h, m)| {
                h.system_id == 7
                    && h.component_id == ONBOARD_COMPUTER_COMPONENT_ID
                    && matches!(m, MavMessage::HEARTBEAT(hb) if hb.custom_mode == 3)
            })
        }));

        connection.stop();
        assert!(transport.is_closed());
        assert!(!connection.is_running());
    }

    #[test]
    fn test_no_heartbeat_before_autopilot() {
        let transport = Arc::new(MockTransport::new());
        let connection = Connection::start_with_transport(
            transport.clone(),
            fast_config(),
            Arc::new(MessageDispatcher::new()),
        )
        .unwrap();
        std::thread::sleep(Duration::from_millis(100));
        connection.stop();
        assert!(transport.written().is_empty());
    }

    #[test]
    fn test_garbage_does_not_stop_loop() {
        let transport = Arc::new(MockTransport::new());
        let connection = Connection::start_with_transport(
            transport.clone(),
            fast_config(),
            Arc::new(MessageDispatcher::new()),
        )
        .unwrap();
        transport.push_read(&[0xFD, 0x09, 0x00, 0xAA, 0xBB]);
        transport.push_read(&[0u8; 64]);
        transport.push_read(&frame(3, 1, &heartbeat(MavType::MAV_TYPE_FIXED_WING)));

        assert!(wait_until(|| connection.link().peers().autopilot_system_id() == Some(3)));
        connection.stop();
    }
}
