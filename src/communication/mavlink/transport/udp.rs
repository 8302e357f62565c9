//! UDP Transport for MAVLink Communication
//!
//! Two modes:
//! - **Bind** (`udp:`): listen on a local address; the remote endpoint is
//!   learned from the first datagram and updated whenever the sender changes
//! - **Connect** (`udpout:`): send to a fixed remote from an ephemeral port
//!
//! Writes before the remote is known fail with [`TransportError::NoPeer`].

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::{MavlinkTransport, TransportError, READ_TIMEOUT};

/// UDP transport for MAVLink communication
pub struct UdpTransport {
    socket: UdpSocket,
    remote: Mutex<Option<SocketAddr>>,
    /// Remote was given explicitly and must not be replaced
    fixed_remote: bool,
    closed: AtomicBool,
}

impl UdpTransport {
    /// Bind to `local` and learn the remote from incoming traffic
    pub fn bind(local: SocketAddr) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(local)?;
        Self::with_socket(socket, None)
    }

    /// Send to a fixed `remote`
    pub fn connect(remote: SocketAddr) -> Result<Self, TransportError> {
        let local: SocketAddr = if remote.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local)?;
        Self::with_socket(socket, Some(remote))
    }

    fn with_socket(socket: UdpSocket, remote: Option<SocketAddr>) -> Result<Self, TransportError> {
        socket.set_read_timeout(Some(READ_TIMEOUT))?;
        Ok(Self {
            socket,
            fixed_remote: remote.is_some(),
            remote: Mutex::new(remote),
            closed: AtomicBool::new(false),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    /// Current remote endpoint, if known
    pub fn remote(&self) -> Option<SocketAddr> {
        *self.remote.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn learn_remote(&self, from: SocketAddr) {
        if self.fixed_remote {
            return;
        }
        let mut remote = self.remote.lock().unwrap_or_else(|e| e.into_inner());
        if *remote != Some(from) {
            crate::log_info!("UDP remote endpoint: {}", from);
            *remote = Some(from);
        }
    }
}

impl MavlinkTransport for UdpTransport {
    fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        match self.socket.recv_from(buf) {
            Ok((n, from)) => {
                self.learn_remote(from);
                Ok(n)
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, buf: &[u8]) -> Result<usize, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let remote = self.remote().ok_or(TransportError::NoPeer)?;
        Ok(self.socket.send_to(buf, remote)?)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn describe(&self) -> String {
        match self.socket.local_addr() {
            Ok(local) => format!("udp {local}"),
            Err(_) => "udp".to_string(),
        }
    }
}
