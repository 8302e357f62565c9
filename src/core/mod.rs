//! Controller infrastructure shared by every subsystem

pub mod logging;
pub mod run_logs;

pub use run_logs::RunLogs;
