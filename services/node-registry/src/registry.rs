//! Node registry: persisted node identities and liveness states.
//!
//! Key layout in the store:
//! - `nodes`: set of registered node IDs (the index)
//! - `node:{id}`: hash of the node's attributes
//! - `node:{id}:state`: scalar liveness state
//!
//! Index, attributes and state are always written in one atomic batch, so a
//! reader never sees an ID in the index without its attributes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use fleet_id::NodeId;
use tracing::{debug, instrument};

use crate::error::{RegistryError, RegistryResult};
use crate::node::{NodeInfo, NodeState, DEFAULT_SSH_PORT};
use crate::store::{KeyValueStore, StoreOp};

const NODE_INDEX: &str = "nodes";

const FIELD_HOST: &str = "host";
const FIELD_MAC: &str = "mac";
const FIELD_USER: &str = "user";
const FIELD_SSH_PORT: &str = "ssh_port";

fn attrs_key(node_id: &NodeId) -> String {
    format!("node:{node_id}")
}

fn state_key(node_id: &NodeId) -> String {
    format!("node:{node_id}:state")
}

/// The registry capability.
///
/// Implemented by the store-backed registry and by wrappers such as the
/// event notifier, which are substitutable for it.
#[async_trait]
pub trait NodeRegistry: Send + Sync {
    /// Inserts or replaces a node. Returns `true` if the node was new.
    async fn save_node(&self, node: NodeInfo) -> RegistryResult<bool>;

    /// Removes a node and its state. Returns `true` if the node existed.
    async fn remove_node(&self, node_id: &NodeId) -> RegistryResult<bool>;

    async fn has_node(&self, node_id: &NodeId) -> RegistryResult<bool>;

    /// IDs of every registered node, sorted.
    async fn node_ids(&self) -> RegistryResult<Vec<NodeId>>;

    /// Every registered node, sorted by ID.
    async fn get_nodes(&self) -> RegistryResult<Vec<NodeInfo>>;

    async fn get_node(&self, node_id: &NodeId) -> RegistryResult<Option<NodeInfo>>;

    /// Records the liveness of one registered node.
    async fn set_node_state(&self, node_id: &NodeId, state: NodeState) -> RegistryResult<()>;

    /// Records many liveness states in one atomic batch.
    async fn set_node_states(&self, states: HashMap<NodeId, NodeState>) -> RegistryResult<()>;

    /// Recorded states. Nodes with unknown state are absent.
    async fn get_node_states(&self) -> RegistryResult<HashMap<NodeId, NodeState>>;

    /// Point lookup that fails with [`RegistryError::UnknownNode`].
    async fn require_node(&self, node_id: &NodeId) -> RegistryResult<NodeInfo> {
        self.get_node(node_id)
            .await?
            .ok_or_else(|| RegistryError::UnknownNode(node_id.clone()))
    }
}

/// Registry persisted in a [`KeyValueStore`].
pub struct StoreRegistry<S> {
    store: Arc<S>,
}

impl<S> Clone for StoreRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: KeyValueStore> StoreRegistry<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

/// Encodes a node as hash fields. Absent optional fields are omitted.
fn encode_node(node: &NodeInfo) -> Vec<(String, String)> {
    let mut fields = vec![(FIELD_HOST.to_string(), node.host.clone())];
    if let Some(mac) = &node.mac {
        fields.push((FIELD_MAC.to_string(), mac.clone()));
    }
    if let Some(user) = &node.user {
        fields.push((FIELD_USER.to_string(), user.clone()));
    }
    fields.push((FIELD_SSH_PORT.to_string(), node.ssh_port.to_string()));
    fields
}

fn decode_node(node_id: NodeId, mut fields: HashMap<String, String>) -> RegistryResult<NodeInfo> {
    let corrupt = |reason: String| RegistryError::CorruptRecord {
        key: attrs_key(&node_id),
        reason,
    };

    let host = fields
        .remove(FIELD_HOST)
        .ok_or_else(|| corrupt("missing host".to_string()))?;

    let ssh_port = match fields.remove(FIELD_SSH_PORT) {
        Some(raw) => raw
            .parse::<u16>()
            .map_err(|e| corrupt(format!("invalid ssh_port '{raw}': {e}")))?,
        None => DEFAULT_SSH_PORT,
    };

    Ok(NodeInfo {
        mac: fields.remove(FIELD_MAC),
        user: fields.remove(FIELD_USER),
        node_id,
        host,
        ssh_port,
    })
}

fn decode_state(node_id: &NodeId, raw: &str) -> RegistryResult<NodeState> {
    NodeState::parse(raw).ok_or_else(|| RegistryError::CorruptRecord {
        key: state_key(node_id),
        reason: format!("invalid state '{raw}'"),
    })
}

/// State write that only lands while the node is still indexed, so a
/// concurrent removal never leaves a state entry behind.
fn state_op(node_id: &NodeId, state: NodeState) -> StoreOp {
    StoreOp::SetIfMember {
        set: NODE_INDEX.to_string(),
        member: node_id.to_string(),
        key: state_key(node_id),
        value: state.as_str().to_string(),
    }
}

fn parse_member(raw: String) -> RegistryResult<NodeId> {
    NodeId::parse(&raw).map_err(|e| RegistryError::CorruptRecord {
        key: NODE_INDEX.to_string(),
        reason: format!("invalid member '{raw}': {e}"),
    })
}

#[async_trait]
impl<S: KeyValueStore + 'static> NodeRegistry for StoreRegistry<S> {
    #[instrument(skip(self, node), fields(node_id = %node.node_id))]
    async fn save_node(&self, node: NodeInfo) -> RegistryResult<bool> {
        let key = attrs_key(&node.node_id);
        let ops = vec![
            StoreOp::SAdd {
                set: NODE_INDEX.to_string(),
                member: node.node_id.to_string(),
            },
            // Full overwrite: fields absent from the new record must not survive.
            StoreOp::Del { key: key.clone() },
            StoreOp::HSet {
                key,
                fields: encode_node(&node),
            },
        ];

        let replies = self.store.exec(ops).await?;
        let created = replies.first() == Some(&1);
        debug!(created, "Node saved");
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn remove_node(&self, node_id: &NodeId) -> RegistryResult<bool> {
        let ops = vec![
            StoreOp::SRem {
                set: NODE_INDEX.to_string(),
                member: node_id.to_string(),
            },
            StoreOp::Del {
                key: attrs_key(node_id),
            },
            StoreOp::Del {
                key: state_key(node_id),
            },
        ];

        let replies = self.store.exec(ops).await?;
        let existed = replies.first() == Some(&1);
        debug!(existed, "Node removed");
        Ok(existed)
    }

    async fn has_node(&self, node_id: &NodeId) -> RegistryResult<bool> {
        Ok(self.store.sismember(NODE_INDEX, node_id.as_str()).await?)
    }

    async fn node_ids(&self) -> RegistryResult<Vec<NodeId>> {
        self.store
            .smembers(NODE_INDEX)
            .await?
            .into_iter()
            .map(parse_member)
            .collect()
    }

    async fn get_nodes(&self) -> RegistryResult<Vec<NodeInfo>> {
        let ids = self.node_ids().await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids.iter().map(attrs_key).collect();
        let records = self.store.hgetall_many(&keys).await?;

        let mut nodes = Vec::with_capacity(ids.len());
        for (node_id, fields) in ids.into_iter().zip(records) {
            if fields.is_empty() {
                // Removed between the index read and the attribute read.
                debug!(node_id = %node_id, "Skipping node without attributes");
                continue;
            }
            nodes.push(decode_node(node_id, fields)?);
        }
        nodes.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        Ok(nodes)
    }

    async fn get_node(&self, node_id: &NodeId) -> RegistryResult<Option<NodeInfo>> {
        let mut records = self.store.hgetall_many(&[attrs_key(node_id)]).await?;
        match records.pop() {
            Some(fields) if !fields.is_empty() => Ok(Some(decode_node(node_id.clone(), fields)?)),
            _ => Ok(None),
        }
    }

    async fn set_node_state(&self, node_id: &NodeId, state: NodeState) -> RegistryResult<()> {
        let replies = self.store.exec(vec![state_op(node_id, state)]).await?;
        if replies.first() != Some(&1) {
            return Err(RegistryError::UnknownNode(node_id.clone()));
        }
        debug!(node_id = %node_id, state = %state, "Node state recorded");
        Ok(())
    }

    async fn set_node_states(&self, states: HashMap<NodeId, NodeState>) -> RegistryResult<()> {
        if states.is_empty() {
            return Ok(());
        }

        let requested = states.len();
        let ops = states
            .iter()
            .map(|(node_id, state)| state_op(node_id, *state))
            .collect();
        let replies = self.store.exec(ops).await?;

        let recorded = replies.iter().filter(|reply| **reply == 1).count();
        if recorded < requested {
            debug!(
                skipped = requested - recorded,
                "States of unregistered nodes not recorded"
            );
        }
        debug!(count = recorded, "Node states recorded");
        Ok(())
    }

    async fn get_node_states(&self) -> RegistryResult<HashMap<NodeId, NodeState>> {
        let ids = self.node_ids().await?;
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let keys: Vec<String> = ids.iter().map(state_key).collect();
        let values = self.store.mget(&keys).await?;

        let mut states = HashMap::with_capacity(ids.len());
        for (node_id, value) in ids.into_iter().zip(values) {
            if let Some(raw) = value {
                let state = decode_state(&node_id, &raw)?;
                states.insert(node_id, state);
            }
        }
        Ok(states)
    }
}
