//! MAVLink 2.0 Protocol Communication
//!
//! Talks to the autopilot (and, through it, the ground station) over a
//! single MAVLink link. Ground-station commands and detection results ride
//! inside TUNNEL messages.
//!
//! # Architecture
//!
//! - **Transport**: UDP (bind or connect) and serial byte streams
//! - **Parser**: Incremental frame extraction from the byte stream
//! - **Writer**: Message serialization with our system/component ids
//! - **Outgoing queue**: Single sender thread draining queued frames
//! - **Dispatcher**: Message-id keyed delivery to handlers
//! - **Connection**: Receive loop, peer discovery and heartbeats
//! - **Handlers**: Tunnel commands and vehicle telemetry
//! - **State**: Autopilot / ground station discovery and liveness
//!
//! # Usage
//!
//! ```ignore
//! let dispatcher = Arc::new(MessageDispatcher::new());
//! let connection = Connection::start(&address, ConnectionConfig::default(), dispatcher.clone())?;
//! StatusNotifier::new(connection.link().clone()).send_info("Controller started");
//! ```

pub mod connection; // Receive/heartbeat loops
pub mod dispatcher; // Message dispatcher (routing to handlers)
pub mod handlers; // Message handlers
pub mod link; // Shared send path
pub mod outgoing_queue; // Sender thread
pub mod parser; // Message parsing
pub mod state; // Peer state
pub mod status_notifier; // STATUSTEXT notification system
pub mod transport; // Transport abstraction layer
pub mod tunnel; // TUNNEL record sending
pub mod writer; // Message writing

pub use connection::{Connection, ConnectionConfig};
pub use dispatcher::MessageDispatcher;
pub use link::MavlinkLink;
pub use status_notifier::{StatusNotifier, StatusSink};
pub use tunnel::TunnelSender;
