//! # Response Cache Repository
//!
//! Last good response per read endpoint, stored under `cache:{path}`.
//! Entries are overwritten on every successful read and never expire.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use till_core::CACHE_KEY_PREFIX;

use crate::error::{DbError, DbResult};
use crate::store::KeyValueStore;

#[derive(Clone)]
pub struct ResponseCacheRepository {
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for ResponseCacheRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCacheRepository").finish_non_exhaustive()
    }
}

impl ResponseCacheRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        ResponseCacheRepository { store }
    }

    /// Storage key for an endpoint (`/api/products` → `cache:/api/products`).
    pub fn storage_key(endpoint: &str) -> String {
        format!("{CACHE_KEY_PREFIX}{endpoint}")
    }

    /// Replaces the cached value for `endpoint`.
    pub async fn put(&self, endpoint: &str, value: &Value) -> DbResult<()> {
        let key = Self::storage_key(endpoint);
        let raw = serde_json::to_string(value).map_err(|e| DbError::serialization(&key, e))?;
        self.store.set(&key, &raw).await
    }

    /// Returns the cached value for `endpoint`.
    ///
    /// An entry that no longer parses counts as absent.
    pub async fn get(&self, endpoint: &str) -> DbResult<Option<Value>> {
        let key = Self::storage_key(endpoint);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key = %key, error = %e, "Ignoring unreadable cache entry");
                Ok(None)
            }
        }
    }
}
