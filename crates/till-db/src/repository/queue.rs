//! # Pending Action Repository
//!
//! The durable list of mutations waiting for the backend.
//!
//! ## Storage Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  key: "pendingActions"                                                  │
//! │  value: [                                                               │
//! │    { "id": "…", "type": "UPDATE_CASH", "data": {…}, "timestamp": "…" }, │
//! │    { "id": "…", "type": "CREATE_SALE", "data": {…}, "timestamp": "…" }, │
//! │  ]                          ▲ head (oldest)            tail (newest) ▲  │
//! │                                                                         │
//! │  key: "failedActions"                                                   │
//! │  value: [ { "action": {…}, "error": "…", "failedAt": "…" } ]            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every read-modify-write goes through one async mutex shared by all
//! clones, so an append can never be lost to a concurrent removal.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use till_core::{FailedAction, QueuedAction, FAILED_ACTIONS_KEY, PENDING_ACTIONS_KEY};

use crate::error::{DbError, DbResult};
use crate::store::KeyValueStore;

/// Ordered, durable list of queued actions plus the record of dropped ones.
#[derive(Clone)]
pub struct PendingActionRepository {
    store: Arc<dyn KeyValueStore>,
    lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for PendingActionRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingActionRepository").finish_non_exhaustive()
    }
}

impl PendingActionRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        PendingActionRepository {
            store,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Appends `action` at the tail. Returns the new queue length.
    pub async fn append(&self, action: &QueuedAction) -> DbResult<usize> {
        let _guard = self.lock.lock().await;

        let mut actions = self.read_pending().await?;
        actions.push(action.clone());
        self.write_json(PENDING_ACTIONS_KEY, &actions).await?;

        debug!(
            action_id = %action.id,
            kind = %action.kind,
            queued = actions.len(),
            "Action appended"
        );
        Ok(actions.len())
    }

    /// Returns the queued actions, oldest first.
    ///
    /// Entries that no longer decode are logged and dropped, and entries
    /// stored without an id are given one; either way the cleaned list is
    /// written back so ids stay stable between reads.
    pub async fn load(&self) -> DbResult<Vec<QueuedAction>> {
        let _guard = self.lock.lock().await;
        self.read_pending().await
    }

    /// Removes the actions whose ids are in `ids`, keeping everything else
    /// in order. Returns how many were removed.
    pub async fn remove_ids(&self, ids: &[String]) -> DbResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let _guard = self.lock.lock().await;

        let doomed: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let actions = self.read_pending().await?;
        let before = actions.len();
        let kept: Vec<QueuedAction> = actions
            .into_iter()
            .filter(|a| !doomed.contains(a.id.as_str()))
            .collect();
        let removed = before - kept.len();

        if kept.is_empty() {
            self.store.remove(PENDING_ACTIONS_KEY).await?;
        } else {
            self.write_json(PENDING_ACTIONS_KEY, &kept).await?;
        }

        debug!(removed, remaining = kept.len(), "Actions removed from queue");
        Ok(removed)
    }

    /// Number of queued actions.
    pub async fn count(&self) -> DbResult<usize> {
        Ok(self.load().await?.len())
    }

    /// Appends a dropped action and its error to the failure record.
    pub async fn record_failure(&self, action: &QueuedAction, error: &str) -> DbResult<()> {
        let _guard = self.lock.lock().await;

        let mut failed = self.read_failed().await?;
        failed.push(FailedAction {
            action: action.clone(),
            error: error.to_string(),
            failed_at: Utc::now(),
        });
        self.write_json(FAILED_ACTIONS_KEY, &failed).await
    }

    /// Returns the failure record, oldest first.
    pub async fn failed(&self) -> DbResult<Vec<FailedAction>> {
        let _guard = self.lock.lock().await;
        self.read_failed().await
    }

    pub async fn clear_failed(&self) -> DbResult<()> {
        let _guard = self.lock.lock().await;
        self.store.remove(FAILED_ACTIONS_KEY).await
    }

    // -------------------------------------------------------------------------
    // Unlocked helpers; callers hold `lock`
    // -------------------------------------------------------------------------

    async fn read_pending(&self) -> DbResult<Vec<QueuedAction>> {
        let Some(raw) = self.store.get(PENDING_ACTIONS_KEY).await? else {
            return Ok(Vec::new());
        };

        let entries = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(entries)) => entries,
            Ok(other) => {
                warn!(found = %other, "Pending action list is not an array, discarding");
                self.store.remove(PENDING_ACTIONS_KEY).await?;
                return Ok(Vec::new());
            }
            Err(e) => {
                warn!(error = %e, "Pending action list is not valid JSON, discarding");
                self.store.remove(PENDING_ACTIONS_KEY).await?;
                return Ok(Vec::new());
            }
        };

        let total = entries.len();
        let mut dirty = false;
        let mut actions = Vec::with_capacity(total);
        for entry in entries {
            if entry.get("id").and_then(Value::as_str).is_none() {
                dirty = true;
            }
            match serde_json::from_value::<QueuedAction>(entry) {
                Ok(action) => actions.push(action),
                Err(e) => {
                    warn!(error = %e, "Dropping undecodable queued action");
                    dirty = true;
                }
            }
        }

        if dirty {
            debug!(total, kept = actions.len(), "Normalizing pending action list");
            self.write_json(PENDING_ACTIONS_KEY, &actions).await?;
        }

        Ok(actions)
    }

    async fn read_failed(&self) -> DbResult<Vec<FailedAction>> {
        match self.store.get(FAILED_ACTIONS_KEY).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| DbError::serialization(FAILED_ACTIONS_KEY, e)),
            None => Ok(Vec::new()),
        }
    }

    async fn write_json<T: serde::Serialize + ?Sized>(&self, key: &str, value: &T) -> DbResult<()> {
        let raw = serde_json::to_string(value).map_err(|e| DbError::serialization(key, e))?;
        self.store.set(key, &raw).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
