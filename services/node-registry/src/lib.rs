//! Fleet node registry.
//!
//! Maintains the authoritative set of machines in a cluster, tracks each
//! node's liveness from probes and agent signals, and dispatches fleet-wide
//! suspend/shutdown/boot commands over an event bus.
//!
//! ## Architecture
//!
//! ```text
//! callers ──► EventNotifier ──► StoreRegistry ──► KeyValueStore
//!                  │
//!                  └──► EventBus ──► StateChangeListener ──► registry
//!                                └──► remote agents (commands)
//!
//! StateSynchronizer: registry ──► LivenessProber ──► registry
//! ClusterGateway:    registry ──► EventBus (commands), LivenessProber
//! ```
//!
//! ## Modules
//!
//! - `store`: key/value store abstraction with SQLite and in-memory backends
//! - `registry`: the `NodeRegistry` capability and its store-backed implementation
//! - `notifier`: publish-after-commit wrapper around a registry
//! - `bus`: event bus and subscriptions
//! - `prober`: concurrent TCP liveness probing
//! - `synchronizer`: periodic reconciliation of recorded liveness
//! - `listener`: applies activation/disconnection signals
//! - `gateway`: fleet command dispatch

pub mod bus;
pub mod config;
pub mod error;
pub mod gateway;
pub mod listener;
pub mod node;
pub mod notifier;
pub mod prober;
pub mod registry;
pub mod store;
pub mod synchronizer;

// Re-export commonly used types
pub use bus::{BusError, EventBus, LocalBus, Subscription};
pub use error::{RegistryError, RegistryResult};
pub use gateway::ClusterGateway;
pub use listener::StateChangeListener;
pub use node::{NodeInfo, NodeState, DEFAULT_SSH_PORT};
pub use notifier::EventNotifier;
pub use prober::{LivenessProber, ProbeError, DEFAULT_PROBE_TIMEOUT};
pub use registry::{NodeRegistry, StoreRegistry};
pub use store::{KeyValueStore, MemoryStore, SqliteStore, StoreError, StoreOp};
pub use synchronizer::{StateSynchronizer, SyncReport};

pub use fleet_events::{EventEnvelope, EventKind, NodeEvent};
pub use fleet_id::NodeId;
