//! Serial Transport for MAVLink Communication
//!
//! Wraps a `serialport` device. The port is cloned once so the receive loop
//! and the sender thread each own a handle and never contend on one lock.

use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serialport::SerialPort;

use super::{MavlinkTransport, TransportError, READ_TIMEOUT};

/// Serial transport for MAVLink communication
pub struct SerialTransport {
    path: String,
    baud: u32,
    reader: Mutex<Box<dyn SerialPort>>,
    writer: Mutex<Box<dyn SerialPort>>,
    closed: AtomicBool,
}

impl SerialTransport {
    /// Open `path` at `baud`, 8N1, no flow control
    pub fn open(path: &str, baud: u32) -> Result<Self, TransportError> {
        let reader = serialport::new(path, baud).timeout(READ_TIMEOUT).open()?;
        let writer = reader.try_clone()?;
        crate::log_info!("Opened serial port {} at {} baud", path, baud);

        Ok(Self {
            path: path.to_string(),
            baud,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closed: AtomicBool::new(false),
        })
    }
}

impl MavlinkTransport for SerialTransport {
    fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let mut port = self.reader.lock().unwrap_or_else(|e| e.into_inner());
        match port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, buf: &[u8]) -> Result<usize, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let mut port = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        port.write_all(buf)?;
        port.flush()?;
        Ok(buf.len())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn describe(&self) -> String {
        format!("serial {} @ {}", self.path, self.baud)
    }
}
