//! MAVLink Message Dispatcher
//!
//! Routes incoming MAVLink messages to subscribed handlers.
//!
//! # Architecture
//!
//! The dispatcher sits between the connection's receive loop and the
//! protocol handlers:
//!
//! 1. The receive loop decodes a message and calls [`MessageDispatcher::dispatch`]
//! 2. The dispatcher looks up subscribers by message id
//! 3. Each subscriber is invoked with the header and message, in
//!    subscription order
//!
//! The command handler subscribes to TUNNEL, the telemetry tracker to
//! GLOBAL_POSITION_INT and ATTITUDE; neither knows about the other.
//!
//! Subscribers run on the receive thread and must not block.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use mavlink::common::MavMessage;
use mavlink::{MavHeader, Message};

/// Message callback
pub type MessageHandler = Arc<dyn Fn(&MavHeader, &MavMessage) + Send + Sync>;

/// Topic-based message dispatcher
#[derive(Default)]
pub struct MessageDispatcher {
    by_id: RwLock<HashMap<u32, Vec<MessageHandler>>>,
}

impl MessageDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for messages with id `message_id`
    pub fn subscribe<F>(&self, message_id: u32, handler: F)
    where
        F: Fn(&MavHeader, &MavMessage) + Send + Sync + 'static,
    {
        self.by_id
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(message_id)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Deliver a message to every subscriber of its id
    ///
    /// Returns the number of handlers invoked.
    pub fn dispatch(&self, header: &MavHeader, message: &MavMessage) -> usize {
        // Clone the list so handlers may subscribe without deadlocking
        let handlers = self
            .by_id
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&message.message_id())
            .cloned()
            .unwrap_or_default();

        for handler in &handlers {
            handler(header, message);
        }
        handlers.len()
    }

    pub fn subscriber_count(&self, message_id: u32) -> usize {
        self.by_id
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&message_id)
            .map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mavlink::common::{ATTITUDE_DATA, HEARTBEAT_DATA};
    use mavlink::MessageData;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn header() -> MavHeader {
        MavHeader {
            system_id: 1,
            component_id: 1,
            sequence: 0,
        }
    }

    #[test]
    fn test_dispatch_by_message_id() {
        let dispatcher = MessageDispatcher::new();
        let heartbeats = Arc::new(AtomicU32::new(0));
        let attitudes = Arc::new(AtomicU32::new(0));

        let hb = heartbeats.clone();
        dispatcher.subscribe(HEARTBEAT_DATA::ID, move |_, _| {
            hb.fetch_add(1, Ordering::SeqCst);
        });
        let att = attitudes.clone();
        dispatcher.subscribe(ATTITUDE_DATA::ID, move |_, msg| {
            assert!(matches!(msg, MavMessage::ATTITUDE(_)));
            att.fetch_add(1, Ordering::SeqCst);
        });

        let n = dispatcher.dispatch(&header(), &MavMessage::HEARTBEAT(HEARTBEAT_DATA::default()));
        assert_eq!(n, 1);
        dispatcher.dispatch(&header(), &MavMessage::ATTITUDE(ATTITUDE_DATA::default()));
        dispatcher.dispatch(&header(), &MavMessage::ATTITUDE(ATTITUDE_DATA::default()));

        assert_eq!(heartbeats.load(Ordering::SeqCst), 1);
        assert_eq!(attitudes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_multiple_subscribers_same_topic() {
        let dispatcher = MessageDispatcher::new();
        let count = Arc::new(AtomicU32::new(0));
        for _ in 0..3 {
            let c = count.clone();
            dispatcher.subscribe(HEARTBEAT_DATA::ID, move |_, _| {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(dispatcher.subscriber_count(HEARTBEAT_DATA::ID), 3);
        dispatcher.dispatch(&header(), &MavMessage::HEARTBEAT(HEARTBEAT_DATA::default()));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_unsubscribed_topic_is_ignored() {
        let dispatcher = MessageDispatcher::new();
        assert_eq!(
            dispatcher.dispatch(&header(), &MavMessage::HEARTBEAT(HEARTBEAT_DATA::default())),
            0
        );
    }
}
