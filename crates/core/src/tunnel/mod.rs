//! Tunnel Protocol
//!
//! Application-defined command/ack/telemetry records carried inside the
//! MAVLink TUNNEL message. Every record starts with a 4-byte header holding
//! the command id; the remaining fields are packed little-endian (see
//! [`record`]).
//!
//! # Commands
//!
//! | id | command          | direction  | bytes |
//! |----|------------------|------------|-------|
//! | 1  | ACK              | outbound   | 76    |
//! | 2  | HEARTBEAT        | outbound   | 8     |
//! | 3  | START_TAGS       | inbound    | 4     |
//! | 4  | END_TAGS         | inbound    | 4     |
//! | 5  | TAG              | inbound    | 32    |
//! | 6  | START_DETECTION  | inbound    | 12    |
//! | 7  | STOP_DETECTION   | inbound    | 4     |
//! | 8  | PULSE            | outbound   | 116   |
//! | 9  | RAW_CAPTURE      | inbound    | 8     |

mod error;
mod record;

pub use error::TunnelError;

use record::{RecordReader, RecordWriter};

/// Capacity of the MAVLink TUNNEL payload field
pub const TUNNEL_PAYLOAD_CAPACITY: usize = 128;

/// Size of the command header
pub const HEADER_LEN: usize = 4;

/// Maximum ACK message text length (bytes, NUL padded)
pub const ACK_MESSAGE_LEN: usize = 64;

/// HEARTBEAT system id identifying this controller
pub const HEARTBEAT_SYSTEM_CONTROLLER: u32 = 1;

/// Tunnel command identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CommandId {
    Ack = 1,
    Heartbeat = 2,
    StartTags = 3,
    EndTags = 4,
    Tag = 5,
    StartDetection = 6,
    StopDetection = 7,
    Pulse = 8,
    RawCapture = 9,
}

impl CommandId {
    /// Map a raw header value to a command id
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            1 => Self::Ack,
            2 => Self::Heartbeat,
            3 => Self::StartTags,
            4 => Self::EndTags,
            5 => Self::Tag,
            6 => Self::StartDetection,
            7 => Self::StopDetection,
            8 => Self::Pulse,
            9 => Self::RawCapture,
            _ => return None,
        })
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Ack => "ACK",
            Self::Heartbeat => "HEARTBEAT",
            Self::StartTags => "START_TAGS",
            Self::EndTags => "END_TAGS",
            Self::Tag => "TAG",
            Self::StartDetection => "START_DETECTION",
            Self::StopDetection => "STOP_DETECTION",
            Self::Pulse => "PULSE",
            Self::RawCapture => "RAW_CAPTURE",
        }
    }

    /// Exact record size in bytes, header included
    pub fn record_len(self) -> usize {
        match self {
            Self::Ack => HEADER_LEN + 4 + 4 + ACK_MESSAGE_LEN,
            Self::Heartbeat => HEADER_LEN + 4,
            Self::StartTags | Self::EndTags | Self::StopDetection => HEADER_LEN,
            Self::Tag => HEADER_LEN + 7 * 4,
            Self::StartDetection => HEADER_LEN + 2 * 4,
            Self::Pulse => PULSE_RECORD_LEN,
            Self::RawCapture => HEADER_LEN + 4,
        }
    }
}

impl core::fmt::Display for CommandId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Human-readable name for a raw command id, used in logs
pub fn command_name(value: u32) -> &'static str {
    CommandId::from_u32(value).map_or("UNKNOWN", CommandId::name)
}

/// ACK result codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CommandResult {
    Failure = 0,
    Success = 1,
}

impl CommandResult {
    pub fn from_success(success: bool) -> Self {
        if success {
            Self::Success
        } else {
            Self::Failure
        }
    }
}

/// SDR hardware selected by START_DETECTION / RAW_CAPTURE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdrType {
    AirspyMini,
    AirspyHf,
}

impl SdrType {
    pub const AIRSPY_MINI: u32 = 1;
    pub const AIRSPY_HF: u32 = 2;

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            Self::AIRSPY_MINI => Some(Self::AirspyMini),
            Self::AIRSPY_HF => Some(Self::AirspyHf),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Self::AirspyMini => Self::AIRSPY_MINI,
            Self::AirspyHf => Self::AIRSPY_HF,
        }
    }
}

/// TAG record as sent by the ground station
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TagRecord {
    pub id: u32,
    pub frequency_hz: u32,
    pub pulse_width_msecs: u32,
    pub intra_pulse1_msecs: u32,
    pub intra_pulse2_msecs: u32,
    pub intra_pulse_uncertainty_msecs: u32,
    pub intra_pulse_jitter_msecs: u32,
}

/// START_DETECTION record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartDetectionInfo {
    /// Raw SDR type; validated by the command handler
    pub sdr_type: u32,
    pub radio_center_frequency_hz: u32,
}

/// RAW_CAPTURE record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawCaptureInfo {
    pub sdr_type: u32,
}

/// ACK record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckInfo {
    pub command: u32,
    pub result: CommandResult,
    pub message: String,
}

/// Tunnel HEARTBEAT record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatInfo {
    pub system_id: u32,
}

/// Size of the PULSE record in bytes
pub const PULSE_RECORD_LEN: usize = HEADER_LEN + 4 + 4 + 8 * 3 + 4 + 4 + 8 + 4 + 4 + 8 * 3 + 8 * 3 + 8;

/// PULSE record: one detection enriched with vehicle pose
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PulseInfo {
    pub tag_id: u32,
    pub frequency_hz: u32,
    pub start_time_seconds: f64,
    pub snr: f64,
    pub stft_score: f64,
    pub group_seq_counter: u32,
    pub group_ind: u32,
    pub group_snr: f64,
    pub detection_status: u32,
    pub confirmed_status: u32,
    /// Latitude (deg)
    pub position_x: f64,
    /// Longitude (deg)
    pub position_y: f64,
    /// Relative altitude (m)
    pub position_z: f64,
    /// Roll (deg)
    pub orientation_x: f64,
    /// Pitch (deg)
    pub orientation_y: f64,
    /// Yaw (deg)
    pub orientation_z: f64,
    pub noise_psd: f64,
}

/// Decoded inbound tunnel command
#[derive(Debug, Clone, PartialEq)]
pub enum TunnelCommand {
    StartTags,
    Tag(TagRecord),
    EndTags,
    StartDetection(StartDetectionInfo),
    StopDetection,
    RawCapture(RawCaptureInfo),
    /// Liveness from the ground station; carries no command semantics
    Heartbeat(HeartbeatInfo),
    /// Outbound-only record received inbound
    Unsupported(CommandId),
}

impl TunnelCommand {
    /// Decode a tunnel payload
    ///
    /// The payload length must match the command's record size exactly.
    pub fn decode(payload: &[u8]) -> Result<Self, TunnelError> {
        let raw = header_command(payload)?;
        let command = CommandId::from_u32(raw).ok_or(TunnelError::UnknownCommand(raw))?;

        if payload.len() != command.record_len() {
            return Err(TunnelError::PayloadLength {
                command: command.name(),
                expected: command.record_len(),
                actual: payload.len(),
            });
        }

        let mut r = RecordReader::new(&payload[HEADER_LEN..]);
        Ok(match command {
            CommandId::StartTags => Self::StartTags,
            CommandId::EndTags => Self::EndTags,
            CommandId::StopDetection => Self::StopDetection,
            CommandId::Tag => Self::Tag(TagRecord {
                id: r.u32(),
                frequency_hz: r.u32(),
                pulse_width_msecs: r.u32(),
                intra_pulse1_msecs: r.u32(),
                intra_pulse2_msecs: r.u32(),
                intra_pulse_uncertainty_msecs: r.u32(),
                intra_pulse_jitter_msecs: r.u32(),
            }),
            CommandId::StartDetection => Self::StartDetection(StartDetectionInfo {
                sdr_type: r.u32(),
                radio_center_frequency_hz: r.u32(),
            }),
            CommandId::RawCapture => Self::RawCapture(RawCaptureInfo { sdr_type: r.u32() }),
            CommandId::Heartbeat => Self::Heartbeat(HeartbeatInfo {
                system_id: r.u32(),
            }),
            CommandId::Ack | CommandId::Pulse => Self::Unsupported(command),
        })
    }

    pub fn id(&self) -> CommandId {
        match self {
            Self::StartTags => CommandId::StartTags,
            Self::Tag(_) => CommandId::Tag,
            Self::EndTags => CommandId::EndTags,
            Self::StartDetection(_) => CommandId::StartDetection,
            Self::StopDetection => CommandId::StopDetection,
            Self::RawCapture(_) => CommandId::RawCapture,
            Self::Heartbeat(_) => CommandId::Heartbeat,
            Self::Unsupported(id) => *id,
        }
    }
}

/// Read the command id from a payload header
pub fn header_command(payload: &[u8]) -> Result<u32, TunnelError> {
    if payload.len() < HEADER_LEN {
        return Err(TunnelError::PayloadTooSmall {
            actual: payload.len(),
        });
    }
    Ok(RecordReader::new(payload).u32())
}

fn header(command: CommandId) -> RecordWriter {
    RecordWriter::new().u32(command.as_u32())
}

/// Encode a header-only command (START_TAGS, END_TAGS, STOP_DETECTION)
pub fn encode_header_only(command: CommandId) -> Vec<u8> {
    header(command).finish()
}

impl TagRecord {
    pub fn encode(&self) -> Vec<u8> {
        header(CommandId::Tag)
            .u32(self.id)
            .u32(self.frequency_hz)
            .u32(self.pulse_width_msecs)
            .u32(self.intra_pulse1_msecs)
            .u32(self.intra_pulse2_msecs)
            .u32(self.intra_pulse_uncertainty_msecs)
            .u32(self.intra_pulse_jitter_msecs)
            .finish()
    }
}

impl StartDetectionInfo {
    pub fn encode(&self) -> Vec<u8> {
        header(CommandId::StartDetection)
            .u32(self.sdr_type)
            .u32(self.radio_center_frequency_hz)
            .finish()
    }
}

impl RawCaptureInfo {
    pub fn encode(&self) -> Vec<u8> {
        header(CommandId::RawCapture).u32(self.sdr_type).finish()
    }
}

impl HeartbeatInfo {
    pub fn encode(&self) -> Vec<u8> {
        header(CommandId::Heartbeat).u32(self.system_id).finish()
    }
}

impl AckInfo {
    /// Encode, truncating the message to `ACK_MESSAGE_LEN - 1` bytes on a
    /// character boundary so the field always ends with a NUL.
    pub fn encode(&self) -> Vec<u8> {
        let mut text = [0u8; ACK_MESSAGE_LEN];
        let mut end = self.message.len().min(ACK_MESSAGE_LEN - 1);
        while !self.message.is_char_boundary(end) {
            end -= 1;
        }
        text[..end].copy_from_slice(&self.message.as_bytes()[..end]);

        header(CommandId::Ack)
            .u32(self.command)
            .u32(self.result as u32)
            .bytes(&text)
            .finish()
    }

    /// Decode an ACK record (used by ground-station tooling and tests)
    pub fn decode(payload: &[u8]) -> Result<Self, TunnelError> {
        let expected = CommandId::Ack.record_len();
        if header_command(payload)? != CommandId::Ack.as_u32() || payload.len() != expected {
            return Err(TunnelError::PayloadLength {
                command: CommandId::Ack.name(),
                expected,
                actual: payload.len(),
            });
        }
        let mut r = RecordReader::new(&payload[HEADER_LEN..]);
        let command = r.u32();
        let result = if r.u32() == CommandResult::Success as u32 {
            CommandResult::Success
        } else {
            CommandResult::Failure
        };
        let text = r.bytes::<ACK_MESSAGE_LEN>();
        let len = text.iter().position(|&b| b == 0).unwrap_or(ACK_MESSAGE_LEN);
        Ok(Self {
            command,
            result,
            message: String::from_utf8_lossy(&text[..len]).into_owned(),
        })
    }
}

impl PulseInfo {
    pub fn encode(&self) -> Vec<u8> {
        header(CommandId::Pulse)
            .u32(self.tag_id)
            .u32(self.frequency_hz)
            .f64(self.start_time_seconds)
            .f64(self.snr)
            .f64(self.stft_score)
            .u32(self.group_seq_counter)
            .u32(self.group_ind)
            .f64(self.group_snr)
            .u32(self.detection_status)
            .u32(self.confirmed_status)
            .f64(self.position_x)
            .f64(self.position_y)
            .f64(self.position_z)
            .f64(self.orientation_x)
            .f64(self.orientation_y)
            .f64(self.orientation_z)
            .f64(self.noise_psd)
            .finish()
    }

    /// Decode a PULSE record (used by ground-station tooling and tests)
    pub fn decode(payload: &[u8]) -> Result<Self, TunnelError> {
        if header_command(payload)? != CommandId::Pulse.as_u32() || payload.len() != PULSE_RECORD_LEN {
            return Err(TunnelError::PayloadLength {
                command: CommandId::Pulse.name(),
                expected: PULSE_RECORD_LEN,
                actual: payload.len(),
            });
        }
        let mut r = RecordReader::new(&payload[HEADER_LEN..]);
        Ok(Self {
            tag_id: r.u32(),
            frequency_hz: r.u32(),
            start_time_seconds: r.f64(),
            snr: r.f64(),
            stft_score: r.f64(),
            group_seq_counter: r.u32(),
            group_ind: r.u32(),
            group_snr: r.f64(),
            detection_status: r.u32(),
            confirmed_status: r.u32(),
            position_x: r.f64(),
            position_y: r.f64(),
            position_z: r.f64(),
            orientation_x: r.f64(),
            orientation_y: r.f64(),
            orientation_z: r.f64(),
            noise_psd: r.f64(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tag() -> TagRecord {
        TagRecord {
            id: 2,
            frequency_hz: 146_000_000,
            pulse_width_msecs: 15,
            intra_pulse1_msecs: 2000,
            intra_pulse2_msecs: 0,
            intra_pulse_uncertainty_msecs: 60,
            intra_pulse_jitter_msecs: 20,
        }
    }

    #[test]
    fn every_record_fits_in_a_tunnel_message() {
        for raw in 1..=9 {
            let id = CommandId::from_u32(raw).unwrap();
            assert!(id.record_len() <= TUNNEL_PAYLOAD_CAPACITY, "{id}");
        }
        assert_eq!(PULSE_RECORD_LEN, 116);
        assert_eq!(CommandId::Ack.record_len(), 76);
    }

    #[test]
    fn decode_tag_record() {
        let payload = sample_tag().encode();
        assert_eq!(payload.len(), 32);
        assert_eq!(
            TunnelCommand::decode(&payload),
            Ok(TunnelCommand::Tag(sample_tag()))
        );
    }

    #[test]
    fn decode_rejects_short_header() {
        assert_eq!(
            TunnelCommand::decode(&[3, 0]),
            Err(TunnelError::PayloadTooSmall { actual: 2 })
        );
    }

    #[test]
    fn decode_rejects_unknown_command() {
        let payload = 42u32.to_le_bytes();
        assert_eq!(
            TunnelCommand::decode(&payload),
            Err(TunnelError::UnknownCommand(42))
        );
    }

    #[test]
    fn decode_rejects_wrong_length() {
        let mut payload = sample_tag().encode();
        payload.push(0);
        assert_eq!(
            TunnelCommand::decode(&payload),
            Err(TunnelError::PayloadLength {
                command: "TAG",
                expected: 32,
                actual: 33
            })
        );

        let mut start_tags = encode_header_only(CommandId::StartTags);
        start_tags.extend_from_slice(&[0, 0, 0, 0]);
        assert!(TunnelCommand::decode(&start_tags).is_err());
    }

    #[test]
    fn inbound_outbound_only_records_are_unsupported() {
        let pulse = PulseInfo::default().encode();
        assert_eq!(
            TunnelCommand::decode(&pulse),
            Ok(TunnelCommand::Unsupported(CommandId::Pulse))
        );
    }

    #[test]
    fn ack_message_is_truncated_and_nul_terminated() {
        let ack = AckInfo {
            command: CommandId::StartDetection.as_u32(),
            result: CommandResult::Success,
            message: "x".repeat(100),
        };
        let payload = ack.encode();
        assert_eq!(payload.len(), 76);
        assert_eq!(payload[payload.len() - 1], 0);

        let decoded = AckInfo::decode(&payload).unwrap();
        assert_eq!(decoded.command, 6);
        assert_eq!(decoded.result, CommandResult::Success);
        assert_eq!(decoded.message.len(), ACK_MESSAGE_LEN - 1);
    }

    #[test]
    fn pulse_fields_survive_encoding() {
        let pulse = PulseInfo {
            tag_id: 3,
            frequency_hz: 146_000_000,
            start_time_seconds: 1_700_000_000.25,
            snr: 42.5,
            confirmed_status: 1,
            position_x: -31.95,
            orientation_z: 270.0,
            noise_psd: 1e-9,
            ..Default::default()
        };
        let payload = pulse.encode();
        assert_eq!(payload.len(), PULSE_RECORD_LEN);
        assert_eq!(PulseInfo::decode(&payload), Ok(pulse));
    }

    #[test]
    fn sdr_type_mapping() {
        assert_eq!(SdrType::from_u32(1), Some(SdrType::AirspyMini));
        assert_eq!(SdrType::from_u32(2), Some(SdrType::AirspyHf));
        assert_eq!(SdrType::from_u32(0), None);
        assert_eq!(command_name(7), "STOP_DETECTION");
        assert_eq!(command_name(99), "UNKNOWN");
    }
}
