//! tag_controller_core - Pure business logic for the tag controller
//!
//! This crate contains the protocol codecs and planning algorithms that do
//! not touch sockets, serial ports or child processes, so they can be tested
//! on the host without any hardware attached.
//!
//! # Design Principles
//!
//! - **No I/O**: Transport, process and filesystem access live in the daemon crate
//! - **Wire formats are explicit**: Every record is encoded field by field, little-endian
//! - **Trait abstractions**: Clocks are injected via [`traits::TimeSource`]
//!
//! # Modules
//!
//! - [`traits`]: Platform-agnostic trait abstractions (TimeSource)
//! - [`tunnel`]: Tunnel command protocol records and codec
//! - [`tags`]: Tag registry, channelizer tuning and detector configs
//! - [`telemetry`]: Time-ordered vehicle pose history
//! - [`pulse`]: Detector pulse records received over UDP

pub mod pulse;
pub mod tags;
pub mod telemetry;
pub mod traits;
pub mod tunnel;
