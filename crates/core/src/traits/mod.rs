//! Core traits shared by the controller crates.
//!
//! # Design
//!
//! - Trait definitions carry no I/O and no feature gates
//! - Mock implementations are always available for host testing
//! - `SystemClock` is the production implementation used by the daemon

pub mod time;

pub use time::{MockTime, SystemClock, TimeSource};
