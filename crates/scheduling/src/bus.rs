//! In-process event bus
//!
//! A tokio broadcast channel of [`EventEnvelope`]s. Subscribers pick the
//! event kinds they care about. A slow subscriber that falls behind loses
//! the oldest events; its next `recv` reports how many with
//! [`BusError::Lagged`] and the following one resumes at the oldest event
//! still buffered.

use std::collections::HashSet;

use flotilla_core::{EventBuilder, EventEnvelope, EventKind, SchedulingEvent};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::BusError;

/// Publish/subscribe hub for scheduling events
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    /// Bus that buffers up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an envelope; returns how many subscribers received it
    pub fn publish(&self, envelope: EventEnvelope) -> usize {
        let kind = envelope.kind();
        match self.tx.send(envelope) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!(event_type = kind.as_str(), "No subscribers for event");
                0
            }
        }
    }

    /// Wrap `event` in a fresh envelope from `source` and publish it
    pub fn emit(&self, event: SchedulingEvent, source: &str) -> usize {
        self.publish(EventBuilder::new(event, source).build())
    }

    /// Subscribe to `kinds`; an empty slice subscribes to every kind
    pub fn subscribe(&self, kinds: &[EventKind]) -> Subscription {
        let kinds = if kinds.is_empty() {
            EventKind::ALL.iter().copied().collect()
        } else {
            kinds.iter().copied().collect()
        };
        Subscription {
            rx: self.tx.subscribe(),
            kinds,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Receiving side of a bus subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<EventEnvelope>,
    kinds: HashSet<EventKind>,
}

impl Subscription {
    /// Next event of a subscribed kind
    pub async fn recv(&mut self) -> Result<EventEnvelope, BusError> {
        loop {
            match self.rx.recv().await {
                Ok(envelope) if self.kinds.contains(&envelope.kind()) => return Ok(envelope),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    return Err(BusError::Lagged(skipped));
                }
                Err(broadcast::error::RecvError::Closed) => return Err(BusError::Closed),
            }
        }
    }

    pub fn kinds(&self) -> &HashSet<EventKind> {
        &self.kinds
    }
}
