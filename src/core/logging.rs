//! Logging abstraction
//!
//! Provides unified logging macros used throughout the controller. All
//! macros forward to `tracing`, so output format and filtering are decided
//! once by [`init`]:
//! - `RUST_LOG` wins when set
//! - otherwise the level from the config file or `--log-level`
//!
//! Status texts sent to the ground station are logged through the same
//! macros, so the local log is a superset of what the operator sees.

use tracing_subscriber::EnvFilter;

/// Default filter when neither `RUST_LOG` nor a level is configured
pub const DEFAULT_LEVEL: &str = "info";

/// Install the global `tracing` subscriber
///
/// Subsequent calls are ignored, which keeps tests that each call `init`
/// from panicking.
pub fn init(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = level.unwrap_or(DEFAULT_LEVEL);
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init();
}

/// Log informational message
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        ::tracing::info!($($arg)*)
    };
}

/// Log warning message
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        ::tracing::warn!($($arg)*)
    };
}

/// Log error message
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        ::tracing::error!($($arg)*)
    };
}

/// Log debug message
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        ::tracing::debug!($($arg)*)
    };
}

/// Log trace message
#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {
        ::tracing::trace!($($arg)*)
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn init_twice_is_harmless() {
        super::init(Some("debug"));
        super::init(Some("not a valid filter ["));
        crate::log_debug!("logging initialised {}", 1);
    }
}
