//! MAVLink Protocol Handlers
//!
//! Message-specific handlers registered on the [`MessageDispatcher`].
//!
//! # Handlers
//!
//! - **Command Handler**: TUNNEL commands from the ground station (tags,
//!   detection start/stop, raw capture)
//! - **Telemetry Tracker**: GLOBAL_POSITION_INT, ATTITUDE
//!
//! [`MessageDispatcher`]: super::dispatcher::MessageDispatcher

pub mod command;
pub mod telemetry;

pub use command::{CommandHandler, CommandSettings, SessionState};
pub use telemetry::TelemetryTracker;
