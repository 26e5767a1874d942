//! # fleet-events
//!
//! Event type definitions and serialization for the fleet node registry.
//!
//! ## Design Principles
//!
//! - Events are immutable records of a committed state transition or an
//!   issued command
//! - Every event names exactly one node
//! - Events are wrapped in an envelope that can leave the process, so
//!   publish-after-commit ordering holds across process boundaries
//!
//! ## Event Types
//!
//! - Registry changes (`node.created`, `node.updated`, `node.removed`)
//! - Liveness signals (`node.activated`, `node.disconnected`)
//! - Fleet commands (`node.suspend_requested`, `node.shutdown_requested`,
//!   `node.boot_requested`)

mod envelope;
mod types;

pub use envelope::*;
pub use types::*;
