//! SQLite-backed `TtlStore`
//!
//! Point values live in `entries`; list elements live in `list_items`, ordered
//! by rowid, with their kind and expiry on the owning `entries` row. Expiry is
//! wall-clock milliseconds so it means the same thing after a restart, and
//! expired rows are purged lazily on access like `InMemoryStore`.
//!
//! The connection sits behind a std mutex and every call runs on the blocking
//! pool.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::info;

use crate::core::store::{StoreError, StoreResult, TtlStore};

const KIND_POINT: &str = "point";
const KIND_LIST: &str = "list";

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file and its tables
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Unavailable(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn, &path.display().to_string())
    }

    /// Store living only as long as this handle
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?, ":memory:")
    }

    fn init(conn: Connection, location: &str) -> StoreResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS entries (
                key TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                value TEXT,
                expires_at INTEGER
            );
            CREATE TABLE IF NOT EXISTS list_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT NOT NULL,
                value TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_list_items_key ON list_items(key, id);",
        )?;
        info!(location, "[PERSIST] SQLite store ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("sqlite connection lock poisoned".to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn expiry(ttl: Option<Duration>) -> Option<i64> {
    ttl.map(|t| now_millis().saturating_add(i64::try_from(t.as_millis()).unwrap_or(i64::MAX)))
}

/// Drop `key` if it has expired, then return its kind
fn live_kind(tx: &Transaction<'_>, key: &str) -> StoreResult<Option<String>> {
    let row: Option<(String, Option<i64>)> = tx
        .query_row(
            "SELECT kind, expires_at FROM entries WHERE key = ?1",
            params![key],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    match row {
        Some((_, Some(at))) if at <= now_millis() => {
            delete_key(tx, key)?;
            Ok(None)
        }
        Some((kind, _)) => Ok(Some(kind)),
        None => Ok(None),
    }
}

fn delete_key(tx: &Transaction<'_>, key: &str) -> StoreResult<()> {
    tx.execute("DELETE FROM list_items WHERE key = ?1", params![key])?;
    tx.execute("DELETE FROM entries WHERE key = ?1", params![key])?;
    Ok(())
}

fn require_list(key: &str, kind: Option<String>) -> StoreResult<bool> {
    match kind.as_deref() {
        None => Ok(false),
        Some(KIND_LIST) => Ok(true),
        Some(_) => Err(StoreError::WrongType(key.to_string())),
    }
}

#[async_trait]
impl TtlStore for SqliteStore {
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> StoreResult<()> {
        let key = key.to_string();
        let expires_at = expiry(ttl);
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM list_items WHERE key = ?1", params![key])?;
            tx.execute(
                "INSERT OR REPLACE INTO entries (key, kind, value, expires_at) VALUES (?1, ?2, ?3, ?4)",
                params![key, KIND_POINT, value, expires_at],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let value: Option<String> = match live_kind(&tx, &key)?.as_deref() {
                None => None,
                Some(KIND_POINT) => tx
                    .query_row("SELECT value FROM entries WHERE key = ?1", params![key], |row| row.get(0))
                    .optional()?,
                Some(_) => return Err(StoreError::WrongType(key)),
            };
            tx.commit()?;
            Ok(value)
        })
        .await
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            delete_key(&tx, &key)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn list_push(&self, key: &str, value: String, ttl: Option<Duration>) -> StoreResult<usize> {
        let key = key.to_string();
        let expires_at = expiry(ttl);
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            if require_list(&key, live_kind(&tx, &key)?)? {
                tx.execute("UPDATE entries SET expires_at = ?2 WHERE key = ?1", params![key, expires_at])?;
            } else {
                tx.execute(
                    "INSERT INTO entries (key, kind, value, expires_at) VALUES (?1, ?2, NULL, ?3)",
                    params![key, KIND_LIST, expires_at],
                )?;
            }
            tx.execute("INSERT INTO list_items (key, value) VALUES (?1, ?2)", params![key, value])?;
            let len: i64 = tx.query_row("SELECT COUNT(*) FROM list_items WHERE key = ?1", params![key], |row| {
                row.get(0)
            })?;
            tx.commit()?;
            Ok(len as usize)
        })
        .await
    }

    async fn list_range(&self, key: &str, start: usize, stop: Option<usize>) -> StoreResult<Vec<String>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            if !require_list(&key, live_kind(&tx, &key)?)? {
                tx.commit()?;
                return Ok(Vec::new());
            }
            // LIMIT -1 reads to the end
            let limit = stop.map(|s| s.saturating_sub(start) as i64).unwrap_or(-1);
            let items = {
                let mut stmt =
                    tx.prepare("SELECT value FROM list_items WHERE key = ?1 ORDER BY id LIMIT ?2 OFFSET ?3")?;
                let rows = stmt.query_map(params![key, limit, start as i64], |row| row.get::<_, String>(0))?;
                rows.collect::<Result<Vec<_>, _>>()?
            };
            tx.commit()?;
            Ok(items)
        })
        .await
    }

    async fn list_len(&self, key: &str) -> StoreResult<usize> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            if !require_list(&key, live_kind(&tx, &key)?)? {
                tx.commit()?;
                return Ok(0);
            }
            let len: i64 = tx.query_row("SELECT COUNT(*) FROM list_items WHERE key = ?1", params![key], |row| {
                row.get(0)
            })?;
            tx.commit()?;
            Ok(len as usize)
        })
        .await
    }

    async fn keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let prefix = prefix.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let now = now_millis();
            tx.execute(
                "DELETE FROM list_items WHERE key IN
                    (SELECT key FROM entries WHERE expires_at IS NOT NULL AND expires_at <= ?1)",
                params![now],
            )?;
            tx.execute(
                "DELETE FROM entries WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                params![now],
            )?;
            let keys = {
                let mut stmt = tx.prepare(
                    "SELECT key FROM entries WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
                )?;
                let rows = stmt.query_map(params![prefix], |row| row.get::<_, String>(0))?;
                rows.collect::<Result<Vec<_>, _>>()?
            };
            tx.commit()?;
            Ok(keys)
        })
        .await
    }
}
