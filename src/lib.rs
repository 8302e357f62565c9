//! tag_controller - Companion-computer controller for drone radio-tag detection
//!
//! Accepts tag lists and detection commands from a ground station over a
//! MAVLink tunnel, runs and supervises the SDR detection pipeline, and
//! forwards detected pulses annotated with vehicle position and attitude.

// Logging macros and run-log directory
pub mod core;

// Communication protocols (MAVLink link, tunnel commands, telemetry)
pub mod communication;

// TOML configuration
pub mod parameters;

// External process supervision
pub mod supervisor;

// Detection pipeline, pulse relay, simulator
pub mod detection;

// Top-level wiring
pub mod controller;

pub use controller::{Controller, StartupError};
pub use parameters::ControllerConfig;
