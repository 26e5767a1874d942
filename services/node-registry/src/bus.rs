//! Event bus: publish/subscribe over node events.
//!
//! Every subscriber owns a bounded queue of envelopes filtered by
//! [`EventKind`]. Publishing waits for room in each matching queue, so a
//! burst larger than the queue slows the publisher down instead of
//! overwriting envelopes a subscriber has not read yet.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use fleet_events::{EventEnvelope, EventKind, NodeEvent};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// Default number of envelopes queued per subscriber.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Errors from the event bus.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The bus no longer accepts events.
    #[error("event bus closed")]
    Closed,
}

/// Publish/subscribe transport for node events.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Wraps the event in an envelope and submits it.
    ///
    /// Returns once the envelope is queued for every current subscriber,
    /// not once any subscriber has processed it.
    async fn publish(&self, event: NodeEvent) -> Result<EventEnvelope, BusError>;

    /// Subscribes to the given kinds. An empty slice subscribes to all.
    fn subscribe(&self, kinds: &[EventKind]) -> Subscription;
}

struct Subscriber {
    kinds: HashSet<EventKind>,
    tx: mpsc::Sender<EventEnvelope>,
}

impl Subscriber {
    fn wants(&self, kind: EventKind) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&kind)
    }
}

/// In-process bus with one bounded queue per subscriber.
///
/// A subscriber that stops reading stalls publishers once its queue is
/// full. Dropping its [`Subscription`] unsubscribes it.
pub struct LocalBus {
    subscribers: Mutex<Vec<Subscriber>>,
    capacity: usize,
    closed: AtomicBool,
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Stops accepting events. Subscribers drain what is queued, then see
    /// the end of their stream.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.subscribers().clear();
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers();
        subscribers.retain(|s| !s.tx.is_closed());
        subscribers.len()
    }

    // The list stays consistent even if a holder panicked.
    fn subscribers(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl EventBus for LocalBus {
    async fn publish(&self, event: NodeEvent) -> Result<EventEnvelope, BusError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }

        let envelope = EventEnvelope::new(event);
        let kind = envelope.kind();
        let targets: Vec<_> = self
            .subscribers()
            .iter()
            .filter(|s| s.wants(kind))
            .map(|s| s.tx.clone())
            .collect();

        // No subscribers is not an error.
        let mut delivered = 0usize;
        for tx in &targets {
            if tx.send(envelope.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        if delivered < targets.len() {
            self.subscribers().retain(|s| !s.tx.is_closed());
        }

        if kind.is_command() {
            debug!(
                event_id = %envelope.event_id,
                command = %kind,
                node_id = %envelope.payload.node_id(),
                delivered,
                "Command published"
            );
        } else {
            debug!(
                event_id = %envelope.event_id,
                event_type = %envelope.event_type,
                node_id = %envelope.payload.node_id(),
                delivered,
                "Event published"
            );
        }
        Ok(envelope)
    }

    fn subscribe(&self, kinds: &[EventKind]) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        if !self.closed.load(Ordering::SeqCst) {
            self.subscribers().push(Subscriber {
                kinds: kinds.iter().copied().collect(),
                tx,
            });
        }
        Subscription { rx }
    }
}

/// A filtered stream of envelopes. Dropping it unsubscribes.
pub struct Subscription {
    rx: mpsc::Receiver<EventEnvelope>,
}

impl Subscription {
    /// Waits for the next envelope. `None` once the bus is closed or gone.
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        self.rx.recv().await
    }

    /// Returns the next envelope already queued, if any.
    pub fn try_recv(&mut self) -> Option<EventEnvelope> {
        self.rx.try_recv().ok()
    }

    /// Drains every queued envelope.
    pub fn drain(&mut self) -> Vec<EventEnvelope> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}
