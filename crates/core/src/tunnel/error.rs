//! Tunnel protocol error types

/// Errors produced while decoding or encoding tunnel payloads
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TunnelError {
    /// Payload shorter than the 4-byte command header
    #[error("payload too small for header: {actual} bytes")]
    PayloadTooSmall { actual: usize },

    /// Header carries a command id this protocol revision does not define
    #[error("unknown command id {0}")]
    UnknownCommand(u32),

    /// Payload length does not match the record size for its command
    #[error("payload length incorrect for {command}: expected {expected}, actual {actual}")]
    PayloadLength {
        command: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Encoded record would not fit in a TUNNEL message
    #[error("record of {0} bytes exceeds tunnel payload capacity")]
    PayloadTooLarge(usize),
}
