//! SQLite-backed store.
//!
//! Sets, hashes and scalars each live in their own table. Every write batch
//! runs in one transaction, and blocking SQLite calls are moved off the
//! async runtime with `spawn_blocking`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use tracing::debug;

use super::{KeyValueStore, StoreError, StoreOp};

/// Upper bound on bound parameters per `IN (...)` query.
const MAX_KEYS_PER_QUERY: usize = 500;

/// SQLite store.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        Self::with_connection(conn)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` against the connection on the blocking pool.
    async fn call<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut *conn)
        })
        .await?
    }
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS set_members (
            set_key TEXT NOT NULL,
            member TEXT NOT NULL,
            PRIMARY KEY (set_key, member)
        );

        CREATE TABLE IF NOT EXISTS hash_fields (
            hash_key TEXT NOT NULL,
            field TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (hash_key, field)
        );

        CREATE TABLE IF NOT EXISTS scalars (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )?;

    debug!("Store schema initialized");
    Ok(())
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn apply_op(tx: &Transaction<'_>, op: StoreOp) -> Result<i64, StoreError> {
    let reply = match op {
        StoreOp::SAdd { set, member } => tx.execute(
            "INSERT OR IGNORE INTO set_members (set_key, member) VALUES (?1, ?2)",
            params![set, member],
        )?,
        StoreOp::SRem { set, member } => tx.execute(
            "DELETE FROM set_members WHERE set_key = ?1 AND member = ?2",
            params![set, member],
        )?,
        StoreOp::HSet { key, fields } => {
            let mut added = 0;
            for (field, value) in fields {
                let inserted = tx.execute(
                    "INSERT OR IGNORE INTO hash_fields (hash_key, field, value) VALUES (?1, ?2, ?3)",
                    params![key, field, value],
                )?;
                if inserted == 0 {
                    tx.execute(
                        "UPDATE hash_fields SET value = ?3 WHERE hash_key = ?1 AND field = ?2",
                        params![key, field, value],
                    )?;
                }
                added += inserted;
            }
            added
        }
        StoreOp::Del { key } => {
            let removed = tx.execute("DELETE FROM hash_fields WHERE hash_key = ?1", params![key])?
                + tx.execute("DELETE FROM scalars WHERE key = ?1", params![key])?
                + tx.execute("DELETE FROM set_members WHERE set_key = ?1", params![key])?;
            usize::from(removed > 0)
        }
        StoreOp::Set { key, value } => {
            tx.execute(
                "INSERT INTO scalars (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
            1
        }
        StoreOp::SetIfMember {
            set,
            member,
            key,
            value,
        } => tx.execute(
            "INSERT INTO scalars (key, value)
             SELECT ?3, ?4 WHERE EXISTS (
                 SELECT 1 FROM set_members WHERE set_key = ?1 AND member = ?2
             )
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![set, member, key, value],
        )?,
    };
    Ok(reply as i64)
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn smembers(&self, set: &str) -> Result<Vec<String>, StoreError> {
        let set = set.to_string();
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT member FROM set_members WHERE set_key = ?1 ORDER BY member",
            )?;
            let members = stmt
                .query_map(params![set], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(members)
        })
        .await
    }

    async fn sismember(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        let set = set.to_string();
        let member = member.to_string();
        self.call(move |conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM set_members WHERE set_key = ?1 AND member = ?2",
                    params![set, member],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn hgetall_many(
        &self,
        keys: &[String],
    ) -> Result<Vec<HashMap<String, String>>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let keys = keys.to_vec();
        self.call(move |conn| {
            let mut by_key: HashMap<String, HashMap<String, String>> = HashMap::new();

            for chunk in keys.chunks(MAX_KEYS_PER_QUERY) {
                let sql = format!(
                    "SELECT hash_key, field, value FROM hash_fields WHERE hash_key IN ({})",
                    placeholders(chunk.len())
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })?;
                for row in rows {
                    let (key, field, value) = row?;
                    by_key.entry(key).or_default().insert(field, value);
                }
            }

            Ok(keys
                .iter()
                .map(|key| by_key.remove(key).unwrap_or_default())
                .collect())
        })
        .await
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let keys = keys.to_vec();
        self.call(move |conn| {
            let mut values: HashMap<String, String> = HashMap::new();

            for chunk in keys.chunks(MAX_KEYS_PER_QUERY) {
                let sql = format!(
                    "SELECT key, value FROM scalars WHERE key IN ({})",
                    placeholders(chunk.len())
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?;
                for row in rows {
                    let (key, value) = row?;
                    values.insert(key, value);
                }
            }

            Ok(keys.iter().map(|key| values.get(key).cloned()).collect())
        })
        .await
    }

    async fn exec(&self, ops: Vec<StoreOp>) -> Result<Vec<i64>, StoreError> {
        self.call(move |conn| {
            let tx = conn.transaction()?;
            let mut replies = Vec::with_capacity(ops.len());
            for op in ops {
                replies.push(apply_op(&tx, op)?);
            }
            // Dropping `tx` on an early return rolls the whole batch back.
            tx.commit()?;
            Ok(replies)
        })
        .await
    }
}
