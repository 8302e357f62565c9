//! Detection session plumbing
//!
//! - [`pipeline`]: process layout of a detection run or raw capture
//! - [`lifecycle`]: ordered start/stop of the supervised processes
//! - [`pulse_relay`]: detector pulses in, tunnel PULSE records out
//! - [`simulator`]: synthetic pulses for testing without radios

pub mod lifecycle;
pub mod pipeline;
pub mod pulse_relay;
pub mod simulator;

pub use lifecycle::{LifecycleJob, LifecycleWorker};
pub use pipeline::{DetectionPipeline, PipelineBuilder, PipelineError};
pub use pulse_relay::PulseRelay;
pub use simulator::PulseSimulator;
