//! Node identity records and liveness states.

use fleet_id::NodeId;
use serde::{Deserialize, Serialize};

/// Port probed when a node does not specify one.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Identity record of a cluster member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Unique key of the node.
    pub node_id: NodeId,
    /// Hostname or IP address.
    pub host: String,
    /// MAC address, used by the remote agent for wake-on-LAN boots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    /// Remote login identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
}

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

impl NodeInfo {
    pub fn new(node_id: NodeId, host: impl Into<String>) -> Self {
        Self {
            node_id,
            host: host.into(),
            mac: None,
            user: None,
            ssh_port: DEFAULT_SSH_PORT,
        }
    }

    #[must_use]
    pub fn with_mac(mut self, mac: impl Into<String>) -> Self {
        self.mac = Some(mac.into());
        self
    }

    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    #[must_use]
    pub fn with_ssh_port(mut self, port: u16) -> Self {
        self.ssh_port = port;
        self
    }
}

/// Last known liveness of a node.
///
/// A node with no recorded state is unknown; that state is only held
/// between registration and the first signal or reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Online,
    Offline,
}

impl NodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "online" => Some(Self::Online),
            "offline" => Some(Self::Offline),
            _ => None,
        }
    }

    /// Maps a probe outcome to a state.
    pub fn from_reachable(reachable: bool) -> Self {
        if reachable {
            Self::Online
        } else {
            Self::Offline
        }
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
