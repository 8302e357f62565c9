//! MAVLink STATUSTEXT Notification System
//!
//! Sends operator-visible status texts to the ground station. Every
//! component that needs to report progress or failure holds a
//! [`StatusNotifier`] clone.
//!
//! # Architecture
//!
//! - **Explicit handle**: notifiers wrap the shared [`MavlinkLink`]; there is
//!   no global instance
//! - **Severity API**: one method per severity level (emergency through debug)
//! - **Single frame**: texts longer than the 50-byte STATUSTEXT field are
//!   truncated; the codec carries no chunking extensions
//! - **Local echo**: every text is also written to the log
//!
//! Texts produced before the ground station is discovered have no
//! recipient; they are logged and counted as dropped.
//!
//! # Usage
//!
//! ```ignore
//! notifier.send_error("Channelizer tuning failed");
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use mavlink::common::{MavMessage, MavSeverity, STATUSTEXT_DATA};

use super::link::MavlinkLink;

/// STATUSTEXT text field size in bytes
pub const MAX_MESSAGE_LEN: usize = 50;

/// Destination for operator-visible status texts
///
/// Implemented by [`StatusNotifier`]; supervisors and handlers take a
/// `Arc<dyn StatusSink>` so they can run without a MAVLink link in tests.
pub trait StatusSink: Send + Sync {
    fn status(&self, severity: MavSeverity, text: &str);

    fn info(&self, text: &str) {
        self.status(MavSeverity::MAV_SEVERITY_INFO, text);
    }

    fn warning(&self, text: &str) {
        self.status(MavSeverity::MAV_SEVERITY_WARNING, text);
    }

    fn error(&self, text: &str) {
        self.status(MavSeverity::MAV_SEVERITY_ERROR, text);
    }
}

/// STATUSTEXT sender bound to a link
#[derive(Clone)]
pub struct StatusNotifier {
    link: Arc<MavlinkLink>,
    dropped_count: Arc<AtomicU32>,
}

impl StatusNotifier {
    pub fn new(link: Arc<MavlinkLink>) -> Self {
        Self {
            link,
            dropped_count: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Texts dropped because no ground station was known
    pub fn dropped_count(&self) -> u32 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    /// Send an EMERGENCY severity message (severity 0)
    pub fn send_emergency(&self, text: &str) {
        self.send_statustext(MavSeverity::MAV_SEVERITY_EMERGENCY, text);
    }

    /// Send an ALERT severity message (severity 1)
    pub fn send_alert(&self, text: &str) {
        self.send_statustext(MavSeverity::MAV_SEVERITY_ALERT, text);
    }

    /// Send a CRITICAL severity message (severity 2)
    pub fn send_critical(&self, text: &str) {
        self.send_statustext(MavSeverity::MAV_SEVERITY_CRITICAL, text);
    }

    /// Send an ERROR severity message (severity 3)
    ///
    /// Used for rejected commands and failed pipeline stages.
    pub fn send_error(&self, text: &str) {
        self.send_statustext(MavSeverity::MAV_SEVERITY_ERROR, text);
    }

    /// Send a WARNING severity message (severity 4)
    pub fn send_warning(&self, text: &str) {
        self.send_statustext(MavSeverity::MAV_SEVERITY_WARNING, text);
    }

    /// Send a NOTICE severity message (severity 5)
    pub fn send_notice(&self, text: &str) {
        self.send_statustext(MavSeverity::MAV_SEVERITY_NOTICE, text);
    }

    /// Send an INFORMATIONAL severity message (severity 6)
    ///
    /// Process start/end notifications use this level.
    pub fn send_info(&self, text: &str) {
        self.send_statustext(MavSeverity::MAV_SEVERITY_INFO, text);
    }

    /// Send a DEBUG severity message (severity 7)
    pub fn send_debug(&self, text: &str) {
        self.send_statustext(MavSeverity::MAV_SEVERITY_DEBUG, text);
    }

    fn send_statustext(&self, severity: MavSeverity, text: &str) {
        match severity {
            MavSeverity::MAV_SEVERITY_EMERGENCY
            | MavSeverity::MAV_SEVERITY_ALERT
            | MavSeverity::MAV_SEVERITY_CRITICAL
            | MavSeverity::MAV_SEVERITY_ERROR => crate::log_error!("STATUSTEXT: {}", text),
            MavSeverity::MAV_SEVERITY_WARNING => crate::log_warn!("STATUSTEXT: {}", text),
            _ => crate::log_info!("STATUSTEXT: {}", text),
        }

        if self.link.gcs_system_id().is_none() {
            self.dropped_count.fetch_add(1, Ordering::Relaxed);
            crate::log_debug!("No ground station yet, status text not sent");
            return;
        }

        self.link.send(&MavMessage::STATUSTEXT(statustext(severity, text)));
    }
}

impl StatusSink for StatusNotifier {
    fn status(&self, severity: MavSeverity, text: &str) {
        self.send_statustext(severity, text);
    }
}

/// Sink that records every text, for tests
#[derive(Debug, Default)]
pub struct RecordingSink {
    texts: std::sync::Mutex<Vec<(MavSeverity, String)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn texts(&self) -> Vec<(MavSeverity, String)> {
        self.texts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Texts only, in order
    pub fn messages(&self) -> Vec<String> {
        self.texts().into_iter().map(|(_, text)| text).collect()
    }

    pub fn contains(&self, text: &str) -> bool {
        self.texts().iter().any(|(_, t)| t == text)
    }
}

impl StatusSink for RecordingSink {
    fn status(&self, severity: MavSeverity, text: &str) {
        self.texts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((severity, text.to_string()));
    }
}

/// Truncate to [`MAX_MESSAGE_LEN`] bytes on a character boundary
fn truncate(text: &str) -> &str {
    if text.len() <= MAX_MESSAGE_LEN {
        return text;
    }
    let mut end = MAX_MESSAGE_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    crate::log_debug!("STATUSTEXT truncated to {} bytes (was {})", end, text.len());
    &text[..end]
}

/// Build one STATUSTEXT; the text is NUL padded to the 50-byte field
pub(crate) fn statustext(severity: MavSeverity, text: &str) -> STATUSTEXT_DATA {
    let bytes = truncate(text).as_bytes();
    let mut text_bytes = [0u8; MAX_MESSAGE_LEN];
    text_bytes[..bytes.len()].copy_from_slice(bytes);
    STATUSTEXT_DATA {
        severity,
        text: text_bytes.into(),
    }
}
