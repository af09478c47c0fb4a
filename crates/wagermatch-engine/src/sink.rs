//! Outbound delivery.
//!
//! The engine addresses events to connections; the transport behind a
//! [`OutboundSink`] owns the actual sockets. Delivery is fire-and-forget:
//! a closed connection simply drops the event.

use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::trace;
use wagermatch_types::{ConnectionId, OutboundEvent};

pub trait OutboundSink: Send + Sync {
    fn deliver(&self, conn: ConnectionId, event: OutboundEvent);
}

/// Forwards every event into an unbounded channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<(ConnectionId, OutboundEvent)>,
}

impl ChannelSink {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(ConnectionId, OutboundEvent)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl OutboundSink for ChannelSink {
    fn deliver(&self, conn: ConnectionId, event: OutboundEvent) {
        if self.tx.send((conn, event)).is_err() {
            trace!(conn = %conn, "Outbound channel closed, event dropped");
        }
    }
}

/// Keeps every delivered event in memory. Used by tests and tooling.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(ConnectionId, OutboundEvent)>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far, in order.
    pub fn all(&self) -> Vec<(ConnectionId, OutboundEvent)> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn for_conn(&self, conn: ConnectionId) -> Vec<OutboundEvent> {
        self.all()
            .into_iter()
            .filter_map(|(c, e)| (c == conn).then_some(e))
            .collect()
    }

    /// Event names delivered to `conn`, in order.
    pub fn names_for(&self, conn: ConnectionId) -> Vec<&'static str> {
        self.for_conn(conn).iter().map(OutboundEvent::name).collect()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl OutboundSink for RecordingSink {
    fn deliver(&self, conn: ConnectionId, event: OutboundEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((conn, event));
    }
}
