//! Event envelope - the common wrapper for every published event.

use chrono::{DateTime, Utc};
use fleet_id::EventId;
use serde::{Deserialize, Serialize};

use crate::{EventKind, NodeEvent};

/// The event envelope.
///
/// Envelopes are created by the bus at publish time and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Time-ordered event identifier.
    pub event_id: EventId,

    /// When the event was published.
    pub occurred_at: DateTime<Utc>,

    /// The dotted event type (e.g., "node.created").
    pub event_type: String,

    /// Event payload.
    pub payload: NodeEvent,
}

impl EventEnvelope {
    /// Wraps an event with a fresh ID and the current time.
    pub fn new(payload: NodeEvent) -> Self {
        Self {
            event_id: EventId::new(),
            occurred_at: Utc::now(),
            event_type: payload.event_type().to_string(),
            payload,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}
