//! Registry error types.

use fleet_id::NodeId;
use thiserror::Error;

use crate::bus::BusError;
use crate::prober::ProbeError;
use crate::store::StoreError;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors surfaced by the registry and the components built on it.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The persistent store failed. Never retried here.
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// A lookup that requires the node to exist did not find it.
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    /// A stored record could not be decoded.
    #[error("corrupt record at '{key}': {reason}")]
    CorruptRecord { key: String, reason: String },

    /// A change was committed but its event could not be published.
    #[error("publish failed: {0}")]
    Publish(#[from] BusError),

    /// A probe failed with something other than a connection failure.
    #[error("probe error: {0}")]
    Probe(#[from] ProbeError),
}

impl RegistryError {
    /// Returns true if the store itself failed.
    pub fn is_persistence(&self) -> bool {
        matches!(self, RegistryError::Persistence(_))
    }
}
