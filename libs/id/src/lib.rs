//! # fleet-id
//!
//! Identifier types for the fleet node registry.
//!
//! ## Design Principles
//!
//! - Node IDs are operator-chosen labels (`n1`, `gpu-rack-07`) and are the
//!   primary key of the registry
//! - Node IDs are embedded in store keys, so they must not contain the key
//!   separator `:` or whitespace
//! - Event IDs are system-generated, prefixed ULIDs (`evt_{ulid}`) so they
//!   sort by publication time
//!
//! ## ID Format
//!
//! - `NodeId`: any non-empty string without whitespace or `:`
//! - `EventId`: `evt_01HV4Z2WQXKJNM8GPQY6VBKC3D`

mod error;
mod types;

pub use error::IdError;
pub use types::*;
