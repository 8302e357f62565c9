//! Communication Protocols
//!
//! # Protocols
//!
//! - **MAVLink 2.0**: link to the autopilot and ground station
//!   - Peer discovery and heartbeats (HEARTBEAT)
//!   - Vehicle telemetry (GLOBAL_POSITION_INT, ATTITUDE)
//!   - Ground-station tunnel protocol (TUNNEL)
//!   - Operator status texts (STATUSTEXT)
//!
//! # Transport Layers
//!
//! - UDP (bind or connect)
//! - Serial (e.g. `/dev/ttyAMA0` at 921600 baud)

pub mod mavlink;
