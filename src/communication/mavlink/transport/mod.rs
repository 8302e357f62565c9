//! MAVLink Transport Abstraction
//!
//! This module provides a trait-based abstraction for the byte link to the
//! flight controller, so the connection layer does not know whether it talks
//! to a serial port or a UDP socket.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │     MAVLink Connection               │
//! │  (framer, writer, dispatcher)        │
//! └──────────┬───────────────────────────┘
//!            │
//!            │ Uses Arc<dyn MavlinkTransport>
//!            │
//!            ▼
//! ┌─────────────────┬────────────────┐
//! │ SerialTransport │  UdpTransport  │
//! │  (serial port)  │  (UDP socket)  │
//! └─────────────────┴────────────────┘
//! ```
//!
//! # Blocking model
//!
//! All methods take `&self` so one thread can sit in `read()` while another
//! writes. Reads use a short timeout and return `Ok(0)` when it expires,
//! which lets the receive loop notice `close()` and its stop flag.
//!
//! # Addresses
//!
//! - `udp:0.0.0.0:14540` - bind and reply to whoever sends first
//! - `udpout:127.0.0.1:14550` - send to a fixed remote
//! - `serial:/dev/ttyACM0:921600` - serial device and baud rate

pub mod serial;
pub mod udp;

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Receive timeout used by every transport
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Largest single read; one UDP datagram or a serial burst
pub const READ_BUFFER_SIZE: usize = 2048;

/// Transport abstraction for MAVLink communication
///
/// - `read()` returns `Ok(0)` on timeout; the caller decides whether to retry
/// - `write()` sends the whole buffer or fails
/// - `close()` is idempotent; later reads and writes return [`TransportError::Closed`]
pub trait MavlinkTransport: Send + Sync {
    /// Read bytes into `buf`, waiting at most [`READ_TIMEOUT`]
    fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Write all of `buf`
    fn write(&self, buf: &[u8]) -> Result<usize, TransportError>;

    /// Close the link and unblock pending reads
    fn close(&self);

    /// Human-readable description for logs
    fn describe(&self) -> String;
}

/// Transport error types
#[derive(Debug, Error)]
pub enum TransportError {
    /// Underlying socket or device error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port could not be opened or configured
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// No remote peer known yet (UDP before the first datagram)
    #[error("no remote endpoint known yet")]
    NoPeer,

    /// The transport has been closed
    #[error("transport closed")]
    Closed,

    /// The link address could not be parsed
    #[error("invalid link address '{0}'")]
    InvalidAddress(String),
}

/// Parsed link address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAddress {
    /// Bind locally and learn the remote from the first datagram
    Udp { bind: SocketAddr },
    /// Send to a fixed remote from an ephemeral local port
    UdpOut { remote: SocketAddr },
    /// Serial device
    Serial { path: String, baud: u32 },
}

impl FromStr for LinkAddress {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TransportError::InvalidAddress(s.to_string());
        let (scheme, rest) = s.split_once(':').ok_or_else(invalid)?;

        match scheme {
            "udp" => Ok(Self::Udp {
                bind: rest.parse().map_err(|_| invalid())?,
            }),
            "udpout" => Ok(Self::UdpOut {
                remote: rest.parse().map_err(|_| invalid())?,
            }),
            "serial" => {
                let (path, baud) = rest.rsplit_once(':').ok_or_else(invalid)?;
                if path.is_empty() {
                    return Err(invalid());
                }
                Ok(Self::Serial {
                    path: path.to_string(),
                    baud: baud.parse().map_err(|_| invalid())?,
                })
            }
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for LinkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Udp { bind } => write!(f, "udp:{bind}"),
            Self::UdpOut { remote } => write!(f, "udpout:{remote}"),
            Self::Serial { path, baud } => write!(f, "serial:{path}:{baud}"),
        }
    }
}

/// Open the transport for an address
pub fn open(address: &LinkAddress) -> Result<Arc<dyn MavlinkTransport>, TransportError> {
    Ok(match address {
        LinkAddress::Udp { bind } => Arc::new(udp::UdpTransport::bind(*bind)?),
        LinkAddress::UdpOut { remote } => Arc::new(udp::UdpTransport::connect(*remote)?),
        LinkAddress::Serial { path, baud } => {
            Arc::new(serial::SerialTransport::open(path, *baud)?)
        }
    })
}

#[cfg(test)]
pub mod mock {
    //! Mock transport implementation for testing
    //!
    //! Reads are served from a queue of chunks so tests can split a frame
    //! across reads; writes are recorded.

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use super::{MavlinkTransport, TransportError, READ_TIMEOUT};

    /// Mock transport for testing
    #[derive(Default)]
    pub struct MockTransport {
        reads: Mutex<VecDeque<Vec<u8>>>,
        written: Mutex<Vec<Vec<u8>>>,
        fail_writes: AtomicBool,
        closed: AtomicBool,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue one chunk to be returned by a single `read()`
        pub fn push_read(&self, data: &[u8]) {
            self.reads.lock().unwrap().push_back(data.to_vec());
        }

        /// Every buffer passed to `write()`, in order
        pub fn written(&self) -> Vec<Vec<u8>> {
            self.written.lock().unwrap().clone()
        }

        pub fn set_fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }

        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    impl MavlinkTransport for MockTransport {
        fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
            if self.is_closed() {
                return Err(TransportError::Closed);
            }
            let chunk = self.reads.lock().unwrap().pop_front();
            match chunk {
                Some(chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    Ok(n)
                }
                None => {
                    std::thread::sleep(READ_TIMEOUT / 10);
                    Ok(0)
                }
            }
        }

        fn write(&self, buf: &[u8]) -> Result<usize, TransportError> {
            if self.is_closed() {
                return Err(TransportError::Closed);
            }
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(TransportError::NoPeer);
            }
            self.written.lock().unwrap().push(buf.to_vec());
            Ok(buf.len())
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        fn describe(&self) -> String {
            "mock".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mock::MockTransport;

    #[test]
    fn test_parse_udp_bind() {
        let addr: LinkAddress = "udp:0.0.0.0:14540".parse().unwrap();
        assert_eq!(
            addr,
            LinkAddress::Udp {
                bind: "0.0.0.0:14540".parse().unwrap()
            }
        );
        assert_eq!(addr.to_string(), "udp:0.0.0.0:14540");
    }

    #[test]
    fn test_parse_udpout() {
        let addr: LinkAddress = "udpout:127.0.0.1:14550".parse().unwrap();
        assert!(matches!(addr, LinkAddress::UdpOut { remote } if remote.port() == 14550));
    }

    #[test]
    fn test_parse_serial() {
        let addr: LinkAddress = "serial:/dev/ttyACM0:921600".parse().unwrap();
        assert_eq!(
            addr,
            LinkAddress::Serial {
                path: "/dev/ttyACM0".to_string(),
                baud: 921_600
            }
        );
    }

    #[test]
    fn test_parse_invalid() {
        for bad in ["", "udp", "tcp:1.2.3.4:5", "udp:notanip", "serial:/dev/tty", "serial::57600"] {
            assert!(
                matches!(bad.parse::<LinkAddress>(), Err(TransportError::InvalidAddress(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_mock_transport_read_chunks() {
        let transport = MockTransport::new();
        transport.push_read(b"Hel");
        transport.push_read(b"lo");

        let mut buf = [0u8; 32];
        assert_eq!(transport.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"Hel");
        assert_eq!(transport.read(&mut buf).unwrap(), 2);
        assert_eq!(transport.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_mock_transport_close() {
        let transport = MockTransport::new();
        transport.write(b"one").unwrap();
        transport.close();

        assert!(matches!(transport.write(b"two"), Err(TransportError::Closed)));
        assert_eq!(transport.written(), vec![b"one".to_vec()]);
    }
}
