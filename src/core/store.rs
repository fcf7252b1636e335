//! TTL key-value store
//!
//! Cross-process shared state for the fallback path (point values via
//! `set`/`get`) and window journaling (ordered lists via `list_push`/
//! `list_range`). Keys and lists share one namespace but never overlap in
//! practice.
//!
//! `InMemoryStore` is process-local; `SqliteStore` (in `sqlite_store`)
//! survives restarts.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store backend unavailable: {0}")]
    Unavailable(String),

    #[error("Key {0} holds a different kind of value")]
    WrongType(String),

    #[error("Store database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Storage interface with per-key expiry
#[async_trait]
pub trait TtlStore: Send + Sync {
    /// Overwrite a point value; `None` ttl keeps it until removed
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> StoreResult<()>;

    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn remove(&self, key: &str) -> StoreResult<()>;

    /// Append to a list; the ttl is (re)applied to the whole list
    async fn list_push(&self, key: &str, value: String, ttl: Option<Duration>) -> StoreResult<usize>;

    /// Elements `[start, stop)`; `stop = None` reads to the end
    async fn list_range(&self, key: &str, start: usize, stop: Option<usize>) -> StoreResult<Vec<String>>;

    async fn list_len(&self, key: &str) -> StoreResult<usize>;

    /// Live keys starting with `prefix`
    async fn keys(&self, prefix: &str) -> StoreResult<Vec<String>>;
}

// =============================================================================
// In-memory implementation
// =============================================================================

#[derive(Debug, Clone)]
enum Value {
    Point(String),
    List(Vec<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }
}

/// Process-local `TtlStore`; expired entries are dropped lazily on access
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
    let now = Instant::now();
    if entries.get(key).map(|e| e.is_expired(now)).unwrap_or(false) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

#[async_trait]
impl TtlStore for InMemoryStore {
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> StoreResult<()> {
        let entry = Entry {
            value: Value::Point(value),
            expires_at: ttl.map(|t| Instant::now() + t),
        };
        self.entries.lock().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut entries = self.entries.lock().await;
        match live(&mut entries, key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Point(v),
                ..
            }) => Ok(Some(v.clone())),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn list_push(&self, key: &str, value: String, ttl: Option<Duration>) -> StoreResult<usize> {
        let mut entries = self.entries.lock().await;
        let expires_at = ttl.map(|t| Instant::now() + t);
        match live(&mut entries, key) {
            Some(entry) => match &mut entry.value {
                Value::List(items) => {
                    items.push(value);
                    entry.expires_at = expires_at;
                    Ok(items.len())
                }
                Value::Point(_) => Err(StoreError::WrongType(key.to_string())),
            },
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::List(vec![value]),
                        expires_at,
                    },
                );
                Ok(1)
            }
        }
    }

    async fn list_range(&self, key: &str, start: usize, stop: Option<usize>) -> StoreResult<Vec<String>> {
        let mut entries = self.entries.lock().await;
        match live(&mut entries, key) {
            None => Ok(Vec::new()),
            Some(Entry {
                value: Value::List(items),
                ..
            }) => {
                let end = stop.unwrap_or(items.len()).min(items.len());
                Ok(items.get(start.min(end)..end).map(<[String]>::to_vec).unwrap_or_default())
            }
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn list_len(&self, key: &str) -> StoreResult<usize> {
        let mut entries = self.entries.lock().await;
        match live(&mut entries, key) {
            None => Ok(0),
            Some(Entry {
                value: Value::List(items),
                ..
            }) => Ok(items.len()),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, e| !e.is_expired(now));
        let mut keys: Vec<String> = entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}
