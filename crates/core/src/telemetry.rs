//! Vehicle telemetry history
//!
//! Detection pulses arrive after the fact, so the controller keeps a short
//! time-ordered history of vehicle poses and answers nearest-timestamp
//! queries against it.
//!
//! # Retention
//!
//! The history only needs to cover the longest pulse-grouping window: a
//! detector confirms a tag after K+1 intra-pulse periods, so samples older
//! than twice that are pruned on every insert.

use std::collections::VecDeque;

/// Global position
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    /// Latitude (deg)
    pub lat: f64,
    /// Longitude (deg)
    pub lon: f64,
    /// Altitude above home (m)
    pub relative_altitude: f64,
}

impl Position {
    /// From GLOBAL_POSITION_INT units (degE7, mm)
    pub fn from_global_int(lat_e7: i32, lon_e7: i32, relative_alt_mm: i32) -> Self {
        Self {
            lat: lat_e7 as f64 / 1e7,
            lon: lon_e7 as f64 / 1e7,
            relative_altitude: relative_alt_mm as f64 * 1e-3,
        }
    }
}

/// Euler attitude in degrees
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Attitude {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl Attitude {
    pub fn from_radians(roll: f32, pitch: f32, yaw: f32) -> Self {
        Self {
            roll: (roll as f64).to_degrees(),
            pitch: (pitch as f64).to_degrees(),
            yaw: (yaw as f64).to_degrees(),
        }
    }
}

/// Vehicle pose at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TelemetrySample {
    /// Seconds since the Unix epoch
    pub timestamp_seconds: f64,
    pub position: Position,
    pub attitude: Attitude,
}

impl TelemetrySample {
    /// The "no telemetry" value returned by an empty cache
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// Retention window for a pulse-grouping period
///
/// `2 × intra_pulse × (K + 1)`, never below `floor_seconds`.
pub fn retention_window(max_intra_pulse_seconds: f64, k: u32, floor_seconds: f64) -> f64 {
    (2.0 * max_intra_pulse_seconds * (k as f64 + 1.0)).max(floor_seconds)
}

/// Bounded, time-ordered sample history
#[derive(Debug, Clone)]
pub struct TelemetryCache {
    samples: VecDeque<TelemetrySample>,
    retention_seconds: f64,
}

impl TelemetryCache {
    pub fn new(retention_seconds: f64) -> Self {
        Self {
            samples: VecDeque::new(),
            retention_seconds,
        }
    }

    pub fn retention_seconds(&self) -> f64 {
        self.retention_seconds
    }

    pub fn set_retention_seconds(&mut self, retention_seconds: f64) {
        self.retention_seconds = retention_seconds;
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&TelemetrySample> {
        self.samples.back()
    }

    /// Insert a sample keeping timestamp order, then prune anything older
    /// than `now_seconds - retention`
    pub fn push(&mut self, sample: TelemetrySample, now_seconds: f64) {
        let at = self
            .samples
            .partition_point(|s| s.timestamp_seconds <= sample.timestamp_seconds);
        self.samples.insert(at, sample);
        self.prune(now_seconds);
    }

    pub fn prune(&mut self, now_seconds: f64) {
        let horizon = now_seconds - self.retention_seconds;
        while self
            .samples
            .front()
            .is_some_and(|s| s.timestamp_seconds < horizon)
        {
            self.samples.pop_front();
        }
    }

    /// Sample nearest to `t`, or the zero sample when empty
    ///
    /// Ties resolve to the earlier sample.
    pub fn telemetry_for_time(&self, t: f64) -> TelemetrySample {
        let mut best: Option<(f64, &TelemetrySample)> = None;
        for sample in &self.samples {
            let diff = (sample.timestamp_seconds - t).abs();
            if best.is_none_or(|(best_diff, _)| diff < best_diff) {
                best = Some((diff, sample));
            }
        }
        best.map(|(_, s)| *s).unwrap_or_default()
    }
}
