//! # Response Cache
//!
//! Keeps the last good response of each read endpoint so lookups keep
//! working through an outage.
//!
//! ```text
//! read(endpoint)
//!     │
//!     ├── fetch ok ──────────────► store (overwrite) ──► return fresh value
//!     │
//!     └── fetch failed
//!            ├── online  ────────► return the error (cache not consulted)
//!            └── offline ─┬──────► cached value present ──► return it
//!                         └──────► absent ──► return the error
//! ```

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use till_db::{KeyValueStore, ResponseCacheRepository};

use crate::connectivity::ConnectivityMonitor;
use crate::error::{SyncError, SyncResult};

#[derive(Debug, Clone)]
pub struct ResponseCache {
    repo: ResponseCacheRepository,
    monitor: ConnectivityMonitor,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn KeyValueStore>, monitor: ConnectivityMonitor) -> Self {
        ResponseCache {
            repo: ResponseCacheRepository::new(store),
            monitor,
        }
    }

    /// Runs `fetch` and caches its result, falling back to the cached value
    /// when the fetch fails while offline.
    pub async fn read_through<F, Fut>(&self, endpoint: &str, fetch: F) -> SyncResult<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SyncResult<Value>>,
    {
        match fetch().await {
            Ok(value) => {
                self.store(endpoint, &value).await;
                Ok(value)
            }
            Err(err) => self.fallback(endpoint, err).await,
        }
    }

    /// Stores `value` for `endpoint`. A failed write is logged only.
    pub async fn store(&self, endpoint: &str, value: &Value) {
        if let Err(e) = self.repo.put(endpoint, value).await {
            warn!(endpoint = %endpoint, error = %e, "Failed to cache response");
        }
    }

    /// Resolves a failed read: the cached value when offline and present,
    /// otherwise the original error.
    pub async fn fallback(&self, endpoint: &str, err: SyncError) -> SyncResult<Value> {
        if self.monitor.is_online() {
            return Err(err);
        }

        match self.repo.get(endpoint).await {
            Ok(Some(value)) => {
                debug!(endpoint = %endpoint, error = %err, "Serving cached response while offline");
                Ok(value)
            }
            Ok(None) => Err(err),
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "Cache lookup failed");
                Err(err)
            }
        }
    }

    /// The cached value for `endpoint`, if any.
    pub async fn peek(&self, endpoint: &str) -> SyncResult<Option<Value>> {
        Ok(self.repo.get(endpoint).await?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
