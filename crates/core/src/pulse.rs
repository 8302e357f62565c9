//! Detector pulse records
//!
//! Detector processes report pulses over UDP as packed little-endian f64
//! records. Several records may share one datagram.

use crate::telemetry::TelemetrySample;
use crate::tunnel::PulseInfo;

/// Number of f64 fields in one detector pulse record
pub const DETECTOR_PULSE_FIELDS: usize = 12;

/// Size of one detector pulse record in bytes
pub const DETECTOR_PULSE_LEN: usize = DETECTOR_PULSE_FIELDS * 8;

/// One pulse as reported by a detector
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DetectorPulse {
    pub tag_id: f64,
    pub frequency_hz: f64,
    pub start_time_seconds: f64,
    pub predict_next_start_seconds: f64,
    pub snr: f64,
    pub stft_score: f64,
    pub group_seq_counter: f64,
    pub group_ind: f64,
    pub group_snr: f64,
    pub detection_status: f64,
    pub confirmed_status: f64,
    pub noise_psd: f64,
}

impl DetectorPulse {
    /// Decode one record; `bytes` must be at least [`DETECTOR_PULSE_LEN`] long
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let record = bytes.get(..DETECTOR_PULSE_LEN)?;
        let mut fields = [0.0f64; DETECTOR_PULSE_FIELDS];
        for (field, chunk) in fields.iter_mut().zip(record.chunks_exact(8)) {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            *field = f64::from_le_bytes(raw);
        }
        let [tag_id, frequency_hz, start_time_seconds, predict_next_start_seconds, snr, stft_score, group_seq_counter, group_ind, group_snr, detection_status, confirmed_status, noise_psd] =
            fields;
        Some(Self {
            tag_id,
            frequency_hz,
            start_time_seconds,
            predict_next_start_seconds,
            snr,
            stft_score,
            group_seq_counter,
            group_ind,
            group_snr,
            detection_status,
            confirmed_status,
            noise_psd,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        [
            self.tag_id,
            self.frequency_hz,
            self.start_time_seconds,
            self.predict_next_start_seconds,
            self.snr,
            self.stft_score,
            self.group_seq_counter,
            self.group_ind,
            self.group_snr,
            self.detection_status,
            self.confirmed_status,
            self.noise_psd,
        ]
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect()
    }

    /// Combine with the vehicle pose nearest to the pulse start
    pub fn to_pulse_info(&self, telemetry: &TelemetrySample) -> PulseInfo {
        PulseInfo {
            tag_id: self.tag_id as u32,
            frequency_hz: self.frequency_hz as u32,
            start_time_seconds: self.start_time_seconds,
            snr: self.snr,
            stft_score: self.stft_score,
            group_seq_counter: self.group_seq_counter as u32,
            group_ind: self.group_ind as u32,
            group_snr: self.group_snr,
            detection_status: self.detection_status as u32,
            confirmed_status: self.confirmed_status as u32,
            position_x: telemetry.position.lat,
            position_y: telemetry.position.lon,
            position_z: telemetry.position.relative_altitude,
            orientation_x: telemetry.attitude.roll,
            orientation_y: telemetry.attitude.pitch,
            orientation_z: telemetry.attitude.yaw,
            noise_psd: self.noise_psd,
        }
    }
}

/// Decode every complete record in a datagram; a trailing partial record
/// is ignored
pub fn decode_datagram(datagram: &[u8]) -> Vec<DetectorPulse> {
    datagram
        .chunks_exact(DETECTOR_PULSE_LEN)
        .filter_map(DetectorPulse::decode)
        .collect()
}
