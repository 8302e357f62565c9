//! Outgoing message queue
//!
//! Single serialization point for everything written to the link. Any
//! thread may enqueue a frame; one sender thread drains the queue and writes
//! frames to the transport in enqueue order, so frames are never interleaved.
//!
//! A write failure is logged and the frame dropped. The sender never retries,
//! so one bad write cannot stall the frames queued behind it.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};

use super::transport::MavlinkTransport;

enum QueueItem {
    Frame(Vec<u8>),
    Shutdown,
}

/// Queue statistics
#[derive(Debug, Default)]
struct QueueStats {
    frames_sent: AtomicU32,
    send_errors: AtomicU32,
}

/// Multi-producer, single-consumer frame queue
pub struct OutgoingMessageQueue {
    tx: Sender<QueueItem>,
    sender: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<QueueStats>,
}

impl OutgoingMessageQueue {
    /// Start the sender thread writing to `transport`
    pub fn start(transport: Arc<dyn MavlinkTransport>) -> std::io::Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let stats = Arc::new(QueueStats::default());
        let thread_stats = Arc::clone(&stats);

        let handle = std::thread::Builder::new()
            .name("mavlink-sender".into())
            .spawn(move || sender_loop(rx, transport, thread_stats))?;

        Ok(Self {
            tx,
            sender: Mutex::new(Some(handle)),
            stats,
        })
    }

    /// Queue one serialized frame; returns false once the queue is shut down
    pub fn enqueue(&self, frame: Vec<u8>) -> bool {
        self.tx.send(QueueItem::Frame(frame)).is_ok()
    }

    pub fn frames_sent(&self) -> u32 {
        self.stats.frames_sent.load(Ordering::Relaxed)
    }

    pub fn send_errors(&self) -> u32 {
        self.stats.send_errors.load(Ordering::Relaxed)
    }

    /// Flush what is already queued, then stop the sender thread
    pub fn shutdown(&self) {
        let handle = self.sender.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            let _ = self.tx.send(QueueItem::Shutdown);
            if handle.join().is_err() {
                crate::log_error!("MAVLink sender thread panicked");
            }
        }
    }
}

impl Drop for OutgoingMessageQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn sender_loop(rx: Receiver<QueueItem>, transport: Arc<dyn MavlinkTransport>, stats: Arc<QueueStats>) {
    while let Ok(item) = rx.recv() {
        let QueueItem::Frame(frame) = item else {
            break;
        };
        match transport.write(&frame) {
            Ok(_) => {
                stats.frames_sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                stats.send_errors.fetch_add(1, Ordering::Relaxed);
                crate::log_warn!("Dropped outbound frame ({} bytes): {}", frame.len(), e);
            }
        }
    }
    crate::log_debug!("MAVLink sender thread exiting");
}
