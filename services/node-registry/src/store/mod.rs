//! Persistent key/value store consumed by the registry.
//!
//! The store exposes Redis-style primitives:
//! - set membership (the node index)
//! - hash records (per-node attributes)
//! - scalar values (per-node liveness state)
//!
//! Writes are always submitted as one atomic batch through
//! [`KeyValueStore::exec`]; multi-key reads are one round trip each.

mod memory;
mod sqlite;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("store connection lock poisoned")]
    Poisoned,

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A single write inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// Add `member` to `set`. Replies 1 if it was not already present.
    SAdd { set: String, member: String },
    /// Remove `member` from `set`. Replies 1 if it was present.
    SRem { set: String, member: String },
    /// Set fields of the hash at `key`. Replies the number of new fields.
    HSet {
        key: String,
        fields: Vec<(String, String)>,
    },
    /// Delete `key` whatever its type. Replies 1 if it existed.
    Del { key: String },
    /// Set the scalar at `key`. Replies 1.
    Set { key: String, value: String },
    /// Set the scalar at `key` only while `member` is in `set`, checked
    /// inside the batch. Replies 1 if written, 0 otherwise.
    SetIfMember {
        set: String,
        member: String,
        key: String,
        value: String,
    },
}

/// Redis-style store with atomic write batches.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Lists the members of a set, sorted.
    async fn smembers(&self, set: &str) -> Result<Vec<String>, StoreError>;

    async fn sismember(&self, set: &str, member: &str) -> Result<bool, StoreError>;

    /// Reads every field of each hash in one round trip.
    ///
    /// The result is positionally aligned with `keys`; a missing hash is an
    /// empty map.
    async fn hgetall_many(
        &self,
        keys: &[String],
    ) -> Result<Vec<HashMap<String, String>>, StoreError>;

    /// Reads many scalars in one round trip, aligned with `keys`.
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError>;

    /// Applies all operations atomically and returns one reply per op.
    ///
    /// Either every operation is applied or none is.
    async fn exec(&self, ops: Vec<StoreOp>) -> Result<Vec<i64>, StoreError>;
}
