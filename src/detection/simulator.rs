//! Simulated detections for ground-station testing without radios
//!
//! Every `intra_pulse_seconds × (k + 1)` seconds a confirmed group of three
//! pulses for tag 3 at 146 MHz is sent, stamped with the current vehicle
//! pose. SNR follows the vehicle yaw so a rotating vehicle sweeps a
//! directional antenna pattern: 60 dB when the antenna faces 180° and 0 dB
//! at 0°.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{RecvTimeoutError, Sender};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tag_controller_core::telemetry::{Attitude, Position};
use tag_controller_core::traits::{SystemClock, TimeSource};
use tag_controller_core::tunnel::PulseInfo;

use crate::communication::mavlink::handlers::TelemetryTracker;
use crate::communication::mavlink::tunnel::TunnelSender;
use crate::parameters::SimulatorParams;

pub const SIMULATED_TAG_ID: u32 = 3;
pub const SIMULATED_FREQUENCY_HZ: u32 = 146_000_000;
pub const PULSES_PER_GROUP: u32 = 3;
pub const MAX_SNR: f64 = 60.0;
const SNR_JITTER: f64 = 0.5;
const NOISE_PSD: f64 = 1e-9;

/// SNR for a vehicle heading given the antenna's offset from the nose
pub fn snr_from_yaw(vehicle_yaw_degrees: f64, antenna_offset_degrees: f64) -> f64 {
    let mut antenna = (vehicle_yaw_degrees + antenna_offset_degrees).rem_euclid(360.0);
    if antenna > 180.0 {
        antenna = 360.0 - antenna;
    }
    antenna / 180.0 * MAX_SNR
}

/// One pulse group ending at `now`, oldest pulse first
pub fn pulse_group<R: Rng>(
    params: &SimulatorParams,
    position: &Position,
    attitude: &Attitude,
    now: f64,
    seq: u32,
    rng: &mut R,
) -> Vec<PulseInfo> {
    let snr = snr_from_yaw(attitude.yaw, params.antenna_offset_degrees);
    (0..PULSES_PER_GROUP)
        .rev()
        .map(|i| PulseInfo {
            tag_id: SIMULATED_TAG_ID,
            frequency_hz: SIMULATED_FREQUENCY_HZ,
            start_time_seconds: now - f64::from(i) * params.intra_pulse_seconds,
            snr: (snr + rng.gen_range(-SNR_JITTER..=SNR_JITTER)).clamp(0.0, MAX_SNR),
            group_seq_counter: seq,
            group_ind: i + 1,
            confirmed_status: 1,
            position_x: position.lat,
            position_y: position.lon,
            position_z: position.relative_altitude,
            orientation_x: attitude.roll,
            orientation_y: attitude.pitch,
            orientation_z: attitude.yaw,
            noise_psd: NOISE_PSD,
            ..PulseInfo::default()
        })
        .collect()
}

/// Background pulse generator
pub struct PulseSimulator {
    stop_tx: Mutex<Option<Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PulseSimulator {
    pub fn start(
        params: SimulatorParams,
        tunnel: TunnelSender,
        telemetry: Arc<TelemetryTracker>,
    ) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let period = params.group_period();

        let handle = std::thread::Builder::new()
            .name("pulse-simulator".into())
            .spawn(move || {
                let mut rng = StdRng::from_entropy();
                let mut seq = 1;
                loop {
                    let ready = telemetry
                        .current()
                        .filter(|_| tunnel.link().gcs_system_id().is_some());
                    if let Some((position, attitude)) = ready {
                        let now = SystemClock.now_secs();
                        for pulse in pulse_group(&params, &position, &attitude, now, seq, &mut rng) {
                            crate::log_info!(
                                "Simulated pulse Id: {} snr: {:5.1} yaw: {:4.0}",
                                pulse.tag_id,
                                pulse.snr,
                                attitude.yaw
                            );
                            tunnel.send_pulse(&pulse);
                        }
                        seq += 1;
                    }
                    match stop_rx.recv_timeout(period) {
                        Err(RecvTimeoutError::Timeout) => {}
                        _ => break,
                    }
                }
            })?;

        crate::log_warn!("Pulse simulator running, every {:?}", period);
        Ok(Self {
            stop_tx: Mutex::new(Some(stop_tx)),
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn stop(&self) {
        drop(self.stop_tx.lock().unwrap_or_else(|e| e.into_inner()).take());
        if let Some(handle) = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take() {
            if handle.join().is_err() {
                crate::log_error!("Pulse simulator panicked");
            }
        }
    }
}

impl Drop for PulseSimulator {
    fn drop(&mut self) {
        self.stop();
    }
}
