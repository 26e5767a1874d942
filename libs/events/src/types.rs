//! Event type definitions for node lifecycle and fleet commands.

use std::fmt;

use fleet_id::NodeId;
use serde::{Deserialize, Serialize};

// =============================================================================
// Event Type Constants
// =============================================================================

/// All event type names as constants.
pub mod event_types {
    // Registry
    pub const NODE_CREATED: &str = "node.created";
    pub const NODE_UPDATED: &str = "node.updated";
    pub const NODE_REMOVED: &str = "node.removed";

    // Liveness
    pub const NODE_ACTIVATED: &str = "node.activated";
    pub const NODE_DISCONNECTED: &str = "node.disconnected";

    // Fleet commands
    pub const NODE_SUSPEND_REQUESTED: &str = "node.suspend_requested";
    pub const NODE_SHUTDOWN_REQUESTED: &str = "node.shutdown_requested";
    pub const NODE_BOOT_REQUESTED: &str = "node.boot_requested";
}

// =============================================================================
// Event Kinds
// =============================================================================

/// Fieldless discriminant of [`NodeEvent`], used for subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NodeCreated,
    NodeUpdated,
    NodeRemoved,
    NodeActivated,
    NodeDisconnected,
    SuspendNodeCommand,
    ShutdownNodeCommand,
    BootNodeCommand,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [EventKind; 8] = [
        EventKind::NodeCreated,
        EventKind::NodeUpdated,
        EventKind::NodeRemoved,
        EventKind::NodeActivated,
        EventKind::NodeDisconnected,
        EventKind::SuspendNodeCommand,
        EventKind::ShutdownNodeCommand,
        EventKind::BootNodeCommand,
    ];

    /// Returns the dotted event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            EventKind::NodeCreated => event_types::NODE_CREATED,
            EventKind::NodeUpdated => event_types::NODE_UPDATED,
            EventKind::NodeRemoved => event_types::NODE_REMOVED,
            EventKind::NodeActivated => event_types::NODE_ACTIVATED,
            EventKind::NodeDisconnected => event_types::NODE_DISCONNECTED,
            EventKind::SuspendNodeCommand => event_types::NODE_SUSPEND_REQUESTED,
            EventKind::ShutdownNodeCommand => event_types::NODE_SHUTDOWN_REQUESTED,
            EventKind::BootNodeCommand => event_types::NODE_BOOT_REQUESTED,
        }
    }

    /// Returns true for the suspend/shutdown/boot commands.
    pub fn is_command(&self) -> bool {
        matches!(
            self,
            EventKind::SuspendNodeCommand
                | EventKind::ShutdownNodeCommand
                | EventKind::BootNodeCommand
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_type())
    }
}

// =============================================================================
// Events
// =============================================================================

/// A node event. Each variant names the node it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeEvent {
    /// A node was registered for the first time.
    NodeCreated { node_id: NodeId },
    /// An existing node record was replaced.
    NodeUpdated { node_id: NodeId },
    /// A node and its liveness state were deleted.
    NodeRemoved { node_id: NodeId },
    /// The node's agent reported itself up.
    NodeActivated { node_id: NodeId },
    /// The node's agent reported itself going away.
    NodeDisconnected { node_id: NodeId },
    SuspendNodeCommand { node_id: NodeId },
    ShutdownNodeCommand { node_id: NodeId },
    BootNodeCommand { node_id: NodeId },
}

impl NodeEvent {
    /// Builds the event of the given kind for a node.
    pub fn new(kind: EventKind, node_id: NodeId) -> Self {
        match kind {
            EventKind::NodeCreated => NodeEvent::NodeCreated { node_id },
            EventKind::NodeUpdated => NodeEvent::NodeUpdated { node_id },
            EventKind::NodeRemoved => NodeEvent::NodeRemoved { node_id },
            EventKind::NodeActivated => NodeEvent::NodeActivated { node_id },
            EventKind::NodeDisconnected => NodeEvent::NodeDisconnected { node_id },
            EventKind::SuspendNodeCommand => NodeEvent::SuspendNodeCommand { node_id },
            EventKind::ShutdownNodeCommand => NodeEvent::ShutdownNodeCommand { node_id },
            EventKind::BootNodeCommand => NodeEvent::BootNodeCommand { node_id },
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            NodeEvent::NodeCreated { .. } => EventKind::NodeCreated,
            NodeEvent::NodeUpdated { .. } => EventKind::NodeUpdated,
            NodeEvent::NodeRemoved { .. } => EventKind::NodeRemoved,
            NodeEvent::NodeActivated { .. } => EventKind::NodeActivated,
            NodeEvent::NodeDisconnected { .. } => EventKind::NodeDisconnected,
            NodeEvent::SuspendNodeCommand { .. } => EventKind::SuspendNodeCommand,
            NodeEvent::ShutdownNodeCommand { .. } => EventKind::ShutdownNodeCommand,
            NodeEvent::BootNodeCommand { .. } => EventKind::BootNodeCommand,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        match self {
            NodeEvent::NodeCreated { node_id }
            | NodeEvent::NodeUpdated { node_id }
            | NodeEvent::NodeRemoved { node_id }
            | NodeEvent::NodeActivated { node_id }
            | NodeEvent::NodeDisconnected { node_id }
            | NodeEvent::SuspendNodeCommand { node_id }
            | NodeEvent::ShutdownNodeCommand { node_id }
            | NodeEvent::BootNodeCommand { node_id } => node_id,
        }
    }

    /// Returns the dotted event type name.
    pub fn event_type(&self) -> &'static str {
        self.kind().event_type()
    }
}

// =============================================================================
// Tests
// =============================================================================
