//! Vehicle Telemetry Tracking
//!
//! Follows the autopilot's position and attitude so detection pulses can be
//! tagged with where the vehicle was when the pulse arrived.
//!
//! # Subscribed Messages
//!
//! - **GLOBAL_POSITION_INT**: lat/lon/relative altitude; a 0,0 fix is ignored
//! - **ATTITUDE**: roll/pitch/yaw, only from the autopilot's component 1
//!
//! # Sampling
//!
//! The latest position and attitude are combined into one sample every
//! `telemetry.sample_interval_ms` and pushed into a [`TelemetryCache`].
//! The cache keeps `max(floor, 2 × max_intra_pulse × (K + 1))` seconds of
//! history, recomputed when a new tag list is accepted.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread::JoinHandle;

use crossbeam_channel::{RecvTimeoutError, Sender};
use mavlink::common::{MavMessage, ATTITUDE_DATA, GLOBAL_POSITION_INT_DATA};
use mavlink::{MavHeader, MessageData};
use tag_controller_core::tags::TagDatabase;
use tag_controller_core::telemetry::{
    retention_window, Attitude, Position, TelemetryCache, TelemetrySample,
};
use tag_controller_core::traits::{SystemClock, TimeSource};

use crate::communication::mavlink::dispatcher::MessageDispatcher;
use crate::communication::mavlink::state::{PeerTracker, AUTOPILOT_COMPONENT_ID};
use crate::parameters::TelemetryParams;

#[derive(Debug, Default)]
struct Latest {
    position: Option<Position>,
    attitude: Option<Attitude>,
}

/// Position/attitude tracker with a time-indexed history
pub struct TelemetryTracker<T: TimeSource = SystemClock> {
    params: TelemetryParams,
    peers: Arc<PeerTracker>,
    clock: T,
    latest: Mutex<Latest>,
    cache: Mutex<TelemetryCache>,
    stop_tx: Mutex<Option<Sender<()>>>,
    sampler: Mutex<Option<JoinHandle<()>>>,
}

impl TelemetryTracker<SystemClock> {
    pub fn new(params: TelemetryParams, peers: Arc<PeerTracker>) -> Arc<Self> {
        Self::with_clock(params, peers, SystemClock)
    }
}

impl<T: TimeSource + 'static> TelemetryTracker<T> {
    pub fn with_clock(params: TelemetryParams, peers: Arc<PeerTracker>, clock: T) -> Arc<Self> {
        Arc::new(Self {
            cache: Mutex::new(TelemetryCache::new(params.retention_floor_seconds)),
            params,
            peers,
            clock,
            latest: Mutex::new(Latest::default()),
            stop_tx: Mutex::new(None),
            sampler: Mutex::new(None),
        })
    }

    /// Subscribe to GLOBAL_POSITION_INT and ATTITUDE
    pub fn register(self: &Arc<Self>, dispatcher: &MessageDispatcher) {
        let tracker = self.clone();
        dispatcher.subscribe(GLOBAL_POSITION_INT_DATA::ID, move |_header, message| {
            if let MavMessage::GLOBAL_POSITION_INT(data) = message {
                tracker.on_global_position(data);
            }
        });
        let tracker = self.clone();
        dispatcher.subscribe(ATTITUDE_DATA::ID, move |header, message| {
            if let MavMessage::ATTITUDE(data) = message {
                tracker.on_attitude(header, data);
            }
        });
    }

    pub fn on_global_position(&self, data: &GLOBAL_POSITION_INT_DATA) {
        if data.lat == 0 && data.lon == 0 {
            return;
        }
        let position = Position::from_global_int(data.lat, data.lon, data.relative_alt);
        lock(&self.latest).position = Some(position);
    }

    pub fn on_attitude(&self, header: &MavHeader, data: &ATTITUDE_DATA) {
        let from_autopilot = self.peers.autopilot_system_id() == Some(header.system_id)
            && header.component_id == AUTOPILOT_COMPONENT_ID;
        if !from_autopilot {
            return;
        }
        lock(&self.latest).attitude = Some(Attitude::from_radians(data.roll, data.pitch, data.yaw));
    }

    /// Push the current pose into the history
    ///
    /// The cycle is skipped until both a position and an attitude have
    /// been received.
    pub fn sample(&self) -> Option<TelemetrySample> {
        let sample = {
            let latest = lock(&self.latest);
            TelemetrySample {
                timestamp_seconds: self.clock.now_secs(),
                position: latest.position?,
                attitude: latest.attitude?,
            }
        };
        lock(&self.cache).push(sample, sample.timestamp_seconds);
        Some(sample)
    }

    /// Latest position and attitude, once both have been received
    pub fn current(&self) -> Option<(Position, Attitude)> {
        let latest = lock(&self.latest);
        Some((latest.position?, latest.attitude?))
    }

    /// Start sampling on a background thread
    pub fn start_sampler(self: &Arc<Self>) -> std::io::Result<()> {
        let mut sampler = lock(&self.sampler);
        if sampler.is_some() {
            return Ok(());
        }
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let interval = self.params.sample_interval();
        let tracker: Weak<Self> = Arc::downgrade(self);

        *sampler = Some(
            std::thread::Builder::new()
                .name("telemetry-sampler".into())
                .spawn(move || loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        _ => break,
                    }
                    match tracker.upgrade() {
                        Some(tracker) => {
                            tracker.sample();
                        }
                        None => break,
                    }
                })?,
        );
        *lock(&self.stop_tx) = Some(stop_tx);
        Ok(())
    }

    pub fn stop(&self) {
        drop(lock(&self.stop_tx).take());
        if let Some(handle) = lock(&self.sampler).take() {
            if handle.thread().id() != std::thread::current().id() && handle.join().is_err() {
                crate::log_error!("Telemetry sampler panicked");
            }
        }
    }

    /// Size the history for the registered tags' grouping window
    pub fn set_retention_for_tags(&self, tags: &TagDatabase) {
        let max_intra_seconds = tags.max_intra_pulse_msecs() as f64 / 1000.0;
        self.set_retention_for(max_intra_seconds, tags.max_k());
    }

    pub fn set_retention_for(&self, max_intra_pulse_seconds: f64, k: u32) {
        let seconds =
            retention_window(max_intra_pulse_seconds, k, self.params.retention_floor_seconds);
        crate::log_info!("Telemetry retention {:.1} s", seconds);
        lock(&self.cache).set_retention_seconds(seconds);
    }

    pub fn retention_seconds(&self) -> f64 {
        lock(&self.cache).retention_seconds()
    }

    /// Sample nearest to `t` (epoch seconds); zero when nothing is recorded
    pub fn telemetry_for_time(&self, t: f64) -> TelemetrySample {
        lock(&self.cache).telemetry_for_time(t)
    }

    pub fn latest(&self) -> Option<TelemetrySample> {
        lock(&self.cache).latest().copied()
    }

    pub fn history_len(&self) -> usize {
        lock(&self.cache).len()
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
