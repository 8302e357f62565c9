//! Time abstraction for timestamping telemetry and detections.
//!
//! Detector processes report pulse start times as UNIX epoch seconds, so
//! every time source here counts from the UNIX epoch rather than from
//! process start.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock time source.
///
/// # Example
///
/// ```
/// use tag_controller_core::traits::{MockTime, TimeSource};
///
/// fn is_stale<T: TimeSource>(time: &T, last_us: u64) -> bool {
///     time.elapsed_since(last_us) > 3_000_000
/// }
///
/// let time = MockTime::with_initial(10_000_000);
/// assert!(is_stale(&time, 1_000_000));
/// assert!(!is_stale(&time, 9_000_000));
/// ```
pub trait TimeSource: Clone + Send + Sync {
    /// Returns current time in microseconds since the UNIX epoch.
    fn now_us(&self) -> u64;

    /// Returns current time in milliseconds since the UNIX epoch.
    fn now_ms(&self) -> u64 {
        self.now_us() / 1000
    }

    /// Returns current time in fractional seconds since the UNIX epoch.
    fn now_secs(&self) -> f64 {
        self.now_us() as f64 / 1_000_000.0
    }

    /// Returns elapsed time in microseconds since a reference point.
    ///
    /// Uses saturating subtraction so a reference in the future yields 0.
    fn elapsed_since(&self, reference_us: u64) -> u64 {
        self.now_us().saturating_sub(reference_us)
    }
}

/// Time source backed by `SystemTime`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now_us(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0)
    }
}

// ============================================================================
// Mock Implementation (always available for testing)
// ============================================================================

/// Mock time source with controllable advancement.
///
/// Clones share the same underlying counter, so a test can hand one clone to
/// a component running on another thread and advance time from the test.
///
/// ```
/// use tag_controller_core::traits::{MockTime, TimeSource};
///
/// let time = MockTime::new();
/// let shared = time.clone();
/// time.advance(1_500);
/// assert_eq!(shared.now_us(), 1_500);
/// assert_eq!(shared.now_ms(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockTime {
    current_us: Arc<AtomicU64>,
}

impl MockTime {
    /// Creates a new `MockTime` starting at time 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new `MockTime` starting at the specified time.
    pub fn with_initial(us: u64) -> Self {
        Self {
            current_us: Arc::new(AtomicU64::new(us)),
        }
    }

    /// Creates a new `MockTime` starting at the specified epoch seconds.
    pub fn with_secs(secs: f64) -> Self {
        Self::with_initial((secs * 1_000_000.0) as u64)
    }

    /// Sets the current time to an absolute value.
    pub fn set(&self, us: u64) {
        self.current_us.store(us, Ordering::SeqCst);
    }

    /// Advances the current time by the specified amount.
    pub fn advance(&self, us: u64) {
        self.current_us.fetch_add(us, Ordering::SeqCst);
    }
}

impl TimeSource for MockTime {
    fn now_us(&self) -> u64 {
        self.current_us.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
