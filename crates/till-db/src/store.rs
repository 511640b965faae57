//! # Key-Value Store
//!
//! The string-keyed store the queue and the cache persist into.
//!
//! ```text
//! ┌──────────────────────────┐
//! │  KeyValueStore (trait)   │
//! │  get / set / remove      │
//! └─────────┬────────────────┘
//!           │
//!     ┌─────┴──────────┐
//!     ▼                ▼
//!  SqliteStore     MemoryStore
//!  (repository/kv) (tests, ephemeral runs)
//! ```
//!
//! Values are opaque strings; callers store JSON.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::DbResult;

/// A durable string-keyed store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the value under `key`, if any.
    async fn get(&self, key: &str) -> DbResult<Option<String>>;

    /// Writes `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> DbResult<()>;

    /// Deletes `key`. Missing keys are not an error.
    async fn remove(&self, key: &str) -> DbResult<()>;
}

/// In-process store; contents are lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> DbResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> DbResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> DbResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
