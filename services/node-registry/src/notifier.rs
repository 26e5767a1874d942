//! Registry wrapper that publishes change events after each commit.
//!
//! `EventNotifier` is itself a [`NodeRegistry`]: callers mutate through it
//! and listeners learn about changes from the bus without the callers
//! knowing who listens. An event is published only after the wrapped
//! registry reports the write committed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use fleet_events::NodeEvent;
use fleet_id::NodeId;
use tracing::warn;

use crate::bus::EventBus;
use crate::error::RegistryResult;
use crate::node::{NodeInfo, NodeState};
use crate::registry::NodeRegistry;

/// Publishes `NodeCreated`/`NodeUpdated`/`NodeRemoved` around a registry.
pub struct EventNotifier {
    inner: Arc<dyn NodeRegistry>,
    bus: Arc<dyn EventBus>,
}

impl EventNotifier {
    pub fn new(inner: Arc<dyn NodeRegistry>, bus: Arc<dyn EventBus>) -> Self {
        Self { inner, bus }
    }

    async fn publish(&self, event: NodeEvent) -> RegistryResult<()> {
        if let Err(e) = self.bus.publish(event.clone()).await {
            warn!(
                error = %e,
                event_type = event.event_type(),
                node_id = %event.node_id(),
                "Change committed but event not published"
            );
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl NodeRegistry for EventNotifier {
    async fn save_node(&self, node: NodeInfo) -> RegistryResult<bool> {
        let node_id = node.node_id.clone();
        let created = self.inner.save_node(node).await?;
        let event = if created {
            NodeEvent::NodeCreated { node_id }
        } else {
            NodeEvent::NodeUpdated { node_id }
        };
        self.publish(event).await?;
        Ok(created)
    }

    async fn remove_node(&self, node_id: &NodeId) -> RegistryResult<bool> {
        let existed = self.inner.remove_node(node_id).await?;
        if existed {
            self.publish(NodeEvent::NodeRemoved {
                node_id: node_id.clone(),
            })
            .await?;
        }
        Ok(existed)
    }

    async fn has_node(&self, node_id: &NodeId) -> RegistryResult<bool> {
        self.inner.has_node(node_id).await
    }

    async fn node_ids(&self) -> RegistryResult<Vec<NodeId>> {
        self.inner.node_ids().await
    }

    async fn get_nodes(&self) -> RegistryResult<Vec<NodeInfo>> {
        self.inner.get_nodes().await
    }

    async fn get_node(&self, node_id: &NodeId) -> RegistryResult<Option<NodeInfo>> {
        self.inner.get_node(node_id).await
    }

    async fn set_node_state(&self, node_id: &NodeId, state: NodeState) -> RegistryResult<()> {
        self.inner.set_node_state(node_id, state).await
    }

    async fn set_node_states(&self, states: HashMap<NodeId, NodeState>) -> RegistryResult<()> {
        self.inner.set_node_states(states).await
    }

    async fn get_node_states(&self) -> RegistryResult<HashMap<NodeId, NodeState>> {
        self.inner.get_node_states().await
    }
}
