//! Fleet-wide command dispatch and ad hoc probing.
//!
//! Commands are fire-and-forget: the gateway publishes one command event
//! per target node and returns once they are on the bus. Executing the
//! command is up to the agent running on each node.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use fleet_events::{EventKind, NodeEvent};
use fleet_id::NodeId;
use tracing::{info, warn};

use crate::bus::EventBus;
use crate::error::RegistryResult;
use crate::node::NodeInfo;
use crate::prober::LivenessProber;
use crate::registry::NodeRegistry;

/// Facade over the registry and the bus for fleet operations.
pub struct ClusterGateway {
    registry: Arc<dyn NodeRegistry>,
    bus: Arc<dyn EventBus>,
    prober: LivenessProber,
}

impl ClusterGateway {
    pub fn new(
        registry: Arc<dyn NodeRegistry>,
        bus: Arc<dyn EventBus>,
        prober: LivenessProber,
    ) -> Self {
        Self {
            registry,
            bus,
            prober,
        }
    }

    /// Every registered node.
    pub async fn nodes(&self) -> RegistryResult<Vec<NodeInfo>> {
        self.registry.get_nodes().await
    }

    /// Requests suspension of the given nodes, or of every registered node.
    ///
    /// Returns the number of commands submitted.
    pub async fn suspend(&self, node_ids: Option<&[NodeId]>) -> RegistryResult<usize> {
        self.dispatch(EventKind::SuspendNodeCommand, node_ids).await
    }

    /// Requests shutdown of the given nodes, or of every registered node.
    pub async fn shutdown(&self, node_ids: Option<&[NodeId]>) -> RegistryResult<usize> {
        self.dispatch(EventKind::ShutdownNodeCommand, node_ids).await
    }

    /// Requests boot of the given nodes, or of every registered node.
    pub async fn boot(&self, node_ids: Option<&[NodeId]>) -> RegistryResult<usize> {
        self.dispatch(EventKind::BootNodeCommand, node_ids).await
    }

    /// Probes the given nodes, or every registered node.
    ///
    /// Read-only: results are returned, not recorded. Requested IDs that
    /// are not registered are skipped.
    pub async fn probe_node_states(
        &self,
        node_ids: Option<&[NodeId]>,
    ) -> RegistryResult<HashMap<NodeId, bool>> {
        let mut nodes = self.registry.get_nodes().await?;

        if let Some(ids) = node_ids {
            let wanted: HashSet<&NodeId> = ids.iter().collect();
            nodes.retain(|node| wanted.contains(&node.node_id));

            if nodes.len() < wanted.len() {
                let known: HashSet<&NodeId> = nodes.iter().map(|n| &n.node_id).collect();
                for missing in wanted.difference(&known) {
                    warn!(node_id = %missing, "Skipping probe of unregistered node");
                }
            }
        }

        Ok(self.prober.probe_many(&nodes).await?)
    }

    /// Probes a single node.
    pub async fn is_up(&self, node: &NodeInfo) -> RegistryResult<bool> {
        Ok(self.prober.probe(node).await?)
    }

    async fn dispatch(&self, kind: EventKind, node_ids: Option<&[NodeId]>) -> RegistryResult<usize> {
        let targets = match node_ids {
            Some(ids) => ids.to_vec(),
            None => self.registry.node_ids().await?,
        };

        for node_id in &targets {
            self.bus.publish(NodeEvent::new(kind, node_id.clone())).await?;
        }

        info!(
            command = %kind,
            count = targets.len(),
            "Fleet command dispatched"
        );
        Ok(targets.len())
    }
}
