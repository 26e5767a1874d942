//! In-memory store for tests and embedding.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{KeyValueStore, StoreError, StoreOp};

#[derive(Debug, Default)]
struct Data {
    sets: HashMap<String, BTreeSet<String>>,
    hashes: HashMap<String, HashMap<String, String>>,
    scalars: HashMap<String, String>,
}

/// Store backed by process memory.
///
/// Every call counts as one round trip, and the store can be switched
/// offline to exercise failure paths.
#[derive(Debug)]
pub struct MemoryStore {
    data: RwLock<Data>,
    available: AtomicBool,
    round_trips: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(Data::default()),
            available: AtomicBool::new(true),
            round_trips: AtomicU64::new(0),
        }
    }

    /// Makes every subsequent call fail (or succeed again).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of calls served so far.
    pub fn round_trips(&self) -> u64 {
        self.round_trips.load(Ordering::SeqCst)
    }

    fn begin(&self) -> Result<(), StoreError> {
        self.round_trips.fetch_add(1, Ordering::SeqCst);
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store offline".to_string()))
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn smembers(&self, set: &str) -> Result<Vec<String>, StoreError> {
        self.begin()?;
        let data = self.data.read().await;
        Ok(data
            .sets
            .get(set)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn sismember(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        self.begin()?;
        let data = self.data.read().await;
        Ok(data.sets.get(set).is_some_and(|m| m.contains(member)))
    }

    async fn hgetall_many(
        &self,
        keys: &[String],
    ) -> Result<Vec<HashMap<String, String>>, StoreError> {
        self.begin()?;
        let data = self.data.read().await;
        Ok(keys
            .iter()
            .map(|key| data.hashes.get(key).cloned().unwrap_or_default())
            .collect())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        self.begin()?;
        let data = self.data.read().await;
        Ok(keys.iter().map(|key| data.scalars.get(key).cloned()).collect())
    }

    async fn exec(&self, ops: Vec<StoreOp>) -> Result<Vec<i64>, StoreError> {
        self.begin()?;
        // All ops apply under one write guard, so readers never see a partial batch.
        let mut data = self.data.write().await;
        let mut replies = Vec::with_capacity(ops.len());

        for op in ops {
            let reply = match op {
                StoreOp::SAdd { set, member } => {
                    i64::from(data.sets.entry(set).or_default().insert(member))
                }
                StoreOp::SRem { set, member } => {
                    let removed = data
                        .sets
                        .get_mut(&set)
                        .is_some_and(|members| members.remove(&member));
                    if data.sets.get(&set).is_some_and(BTreeSet::is_empty) {
                        data.sets.remove(&set);
                    }
                    i64::from(removed)
                }
                StoreOp::HSet { key, fields } => {
                    let hash = data.hashes.entry(key).or_default();
                    let mut added = 0;
                    for (field, value) in fields {
                        if hash.insert(field, value).is_none() {
                            added += 1;
                        }
                    }
                    added
                }
                StoreOp::Del { key } => {
                    let existed = data.hashes.remove(&key).is_some()
                        | data.scalars.remove(&key).is_some()
                        | data.sets.remove(&key).is_some();
                    i64::from(existed)
                }
                StoreOp::Set { key, value } => {
                    data.scalars.insert(key, value);
                    1
                }
                StoreOp::SetIfMember {
                    set,
                    member,
                    key,
                    value,
                } => {
                    if data.sets.get(&set).is_some_and(|m| m.contains(&member)) {
                        data.scalars.insert(key, value);
                        1
                    } else {
                        0
                    }
                }
            };
            replies.push(reply);
        }

        Ok(replies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sadd(set: &str, member: &str) -> StoreOp {
        StoreOp::SAdd {
            set: set.to_string(),
            member: member.to_string(),
        }
    }

    #[tokio::test]
    async fn test_exec_replies_follow_redis_semantics() {
        let store = MemoryStore::new();

        let replies = store
            .exec(vec![
                sadd("nodes", "n1"),
                sadd("nodes", "n1"),
                StoreOp::HSet {
                    key: "node:n1".to_string(),
                    fields: vec![("host".to_string(), "h".to_string())],
                },
                StoreOp::Del {
                    key: "missing".to_string(),
                },
            ])
            .await
            .unwrap();

        assert_eq!(replies, vec![1, 0, 1, 0]);
        assert_eq!(store.smembers("nodes").await.unwrap(), vec!["n1"]);
    }

    #[tokio::test]
    async fn test_conditional_set_sees_earlier_ops_in_batch() {
        let store = MemoryStore::new();
        let set_if = |member: &str| StoreOp::SetIfMember {
            set: "nodes".to_string(),
            member: member.to_string(),
            key: format!("node:{member}:state"),
            value: "online".to_string(),
        };

        let replies = store
            .exec(vec![set_if("n1"), sadd("nodes", "n1"), set_if("n1")])
            .await
            .unwrap();

        assert_eq!(replies, vec![0, 1, 1]);
        assert_eq!(
            store.mget(&["node:n1:state".to_string()]).await.unwrap(),
            vec![Some("online".to_string())]
        );
    }

    #[tokio::test]
    async fn test_offline_store_rejects_calls() {
        let store = MemoryStore::new();
        store.set_available(false);

        let err = store.smembers("nodes").await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));

        store.set_available(true);
        assert!(store.smembers("nodes").await.unwrap().is_empty());
        assert_eq!(store.round_trips(), 2);
    }

    #[tokio::test]
    async fn test_batched_reads_are_aligned() {
        let store = MemoryStore::new();
        store
            .exec(vec![StoreOp::Set {
                key: "b".to_string(),
                value: "2".to_string(),
            }])
            .await
            .unwrap();

        let values = store
            .mget(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(values, vec![None, Some("2".to_string())]);
    }
}
