//! MAVLink Message Framer
//!
//! Incremental parsing of a MAVLink byte stream using rust-mavlink.
//!
//! # Architecture
//!
//! - Bytes are appended as they arrive from the transport
//! - Complete frames (v1 or v2, signed or unsigned) are cut at magic bytes
//!   and handed to rust-mavlink's `read_v1_msg()` / `read_v2_msg()`
//! - A frame split across reads stays buffered until the rest arrives
//! - A frame that fails to decode (CRC, unknown id) costs only its magic
//!   byte; scanning resumes right after it
//!
//! # Buffer Management
//!
//! Each connection owns its framer, so residual bytes never leak between
//! links. The buffer is capped at [`RX_BUFFER_SIZE`]; garbage beyond that is
//! discarded and counted as an overflow.

use std::io::Cursor;

use mavlink::common::MavMessage;
use mavlink::peek_reader::PeekReader;
use mavlink::MavHeader;

/// Maximum size of receive buffer (bytes)
pub const RX_BUFFER_SIZE: usize = 4096;

const MAGIC_V1: u8 = 0xFE;
const MAGIC_V2: u8 = 0xFD;

/// v1: magic, len, seq, sysid, compid, msgid, payload, crc(2)
const V1_OVERHEAD: usize = 8;
/// v2: magic, len, incompat, compat, seq, sysid, compid, msgid(3), payload, crc(2)
const V2_OVERHEAD: usize = 12;
const V2_SIGNATURE_LEN: usize = 13;
const V2_FLAG_SIGNED: u8 = 0x01;

/// Parser statistics for monitoring and diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserStats {
    /// Total messages successfully parsed
    pub messages_received: u32,
    /// Parse errors (CRC failures, malformed messages)
    pub parse_errors: u32,
    /// Bytes skipped while searching for a frame start
    pub bytes_discarded: u32,
    /// Buffer overflow events
    pub buffer_overflows: u32,
}

/// Incremental MAVLink frame parser
#[derive(Debug, Default)]
pub struct MessageFramer {
    rx_buffer: Vec<u8>,
    stats: ParserStats,
}

impl MessageFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get parser statistics
    pub fn stats(&self) -> ParserStats {
        self.stats
    }

    /// Reset parser statistics
    pub fn reset_stats(&mut self) {
        self.stats = ParserStats::default();
    }

    /// Bytes held waiting for the rest of a frame
    pub fn pending(&self) -> usize {
        self.rx_buffer.len()
    }

    /// Append `bytes` and return every message now complete
    pub fn push(&mut self, bytes: &[u8]) -> Vec<(MavHeader, MavMessage)> {
        self.rx_buffer.extend_from_slice(bytes);
        let mut messages = Vec::new();

        loop {
            let Some(pos) = self
                .rx_buffer
                .iter()
                .position(|&b| b == MAGIC_V1 || b == MAGIC_V2)
            else {
                self.discard(self.rx_buffer.len());
                break;
            };
            if pos > 0 {
                self.discard(pos);
            }
            if self.rx_buffer.len() < 3 {
                break;
            }

            let magic = self.rx_buffer[0];
            let payload_len = self.rx_buffer[1] as usize;
            let frame_size = if magic == MAGIC_V2 {
                let signed = self.rx_buffer[2] & V2_FLAG_SIGNED != 0;
                V2_OVERHEAD + payload_len + if signed { V2_SIGNATURE_LEN } else { 0 }
            } else {
                V1_OVERHEAD + payload_len
            };

            if self.rx_buffer.len() < frame_size {
                break;
            }

            let result = {
                let mut reader = PeekReader::new(Cursor::new(&self.rx_buffer[..frame_size]));
                if magic == MAGIC_V2 {
                    mavlink::read_v2_msg::<MavMessage, _>(&mut reader)
                } else {
                    mavlink::read_v1_msg::<MavMessage, _>(&mut reader)
                }
            };

            // The codec skips ahead on a bad CRC; only accept the frame at offset 0
            let result = result.and_then(|message| {
                if header_at_start(&self.rx_buffer, &message.0) {
                    Ok(message)
                } else {
                    Err(mavlink::error::MessageReadError::Io(std::io::ErrorKind::InvalidData.into()))
                }
            });

            match result {
                Ok(message) => {
                    self.rx_buffer.drain(..frame_size);
                    self.stats.messages_received = self.stats.messages_received.wrapping_add(1);
                    messages.push(message);
                }
                Err(e) => {
                    // The length byte is unverified; only the magic byte is
                    // known to be bad, so resync from the next byte
                    self.stats.parse_errors = self.stats.parse_errors.wrapping_add(1);
                    crate::log_debug!("Dropped malformed MAVLink frame ({} bytes): {:?}", frame_size, e);
                    self.discard(1);
                }
            }
        }

        if self.rx_buffer.len() > RX_BUFFER_SIZE {
            self.stats.buffer_overflows = self.stats.buffer_overflows.wrapping_add(1);
            let excess = self.rx_buffer.len() - RX_BUFFER_SIZE;
            self.discard(excess);
        }

        messages
    }

    fn discard(&mut self, n: usize) {
        self.rx_buffer.drain(..n);
        self.stats.bytes_discarded = self.stats.bytes_discarded.wrapping_add(n as u32);
    }
}

/// Whether `header` is the one encoded at the start of `frame`
fn header_at_start(frame: &[u8], header: &MavHeader) -> bool {
    let (seq, sysid, compid) = if frame[0] == MAGIC_V2 { (4, 5, 6) } else { (2, 3, 4) };
    frame[seq] == header.sequence && frame[sysid] == header.system_id && frame[compid] == header.component_id
}
