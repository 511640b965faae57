//! # Offline Action Queue
//!
//! Defers mutating calls made while offline and replays them, once, in
//! order, when connectivity returns.
//!
//! ## Replay Pass
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Replay Pass                                     │
//! │                                                                         │
//! │  1. take replay lock (one pass at a time)                              │
//! │  2. snapshot = pending list                                            │
//! │  3. for action in snapshot (in order):                                 │
//! │        dispatch(action)                                                │
//! │          ├── ok                     → succeeded                        │
//! │          ├── no response + requeue  → stays queued                     │
//! │          └── any other failure      → logged, failure record, dropped  │
//! │  4. remove the snapshot's entries (except requeued ones)               │
//! │                                                                         │
//! │  Actions enqueued during steps 2-4 are not in the snapshot: they stay  │
//! │  queued behind it and go out with the next pass.                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use till_core::{ActionKind, FailedAction, QueuedAction};
use till_db::{KeyValueStore, PendingActionRepository};

use crate::error::SyncResult;

// =============================================================================
// Dispatcher
// =============================================================================

/// Performs a queued action against the backend.
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    async fn dispatch(&self, action: &QueuedAction) -> SyncResult<()>;
}

// =============================================================================
// Replay Report
// =============================================================================

/// Outcome of one replay pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    /// Actions in the snapshot.
    pub attempted: usize,
    pub succeeded: usize,
    /// Dropped after a failed dispatch.
    pub failed: usize,
    /// Kept queued after a connectivity failure.
    pub requeued: usize,
}

impl ReplayReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.requeued == 0
    }
}

// =============================================================================
// Offline Queue
// =============================================================================

/// Durable FIFO of actions awaiting replay.
#[derive(Debug, Clone)]
pub struct OfflineQueue {
    repo: PendingActionRepository,
    replay_lock: Arc<Mutex<()>>,
    requeue_on_connectivity_error: bool,
}

impl OfflineQueue {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        OfflineQueue {
            repo: PendingActionRepository::new(store),
            replay_lock: Arc::new(Mutex::new(())),
            requeue_on_connectivity_error: false,
        }
    }

    /// Keeps actions queued when their replay fails without a response.
    pub fn with_requeue_on_connectivity_error(mut self, requeue: bool) -> Self {
        self.requeue_on_connectivity_error = requeue;
        self
    }

    /// Queues `payload` for replay as `kind`.
    ///
    /// Never fails: a storage error is logged and the action is lost, the
    /// same as a replay failure would lose it.
    pub async fn enqueue(&self, kind: ActionKind, payload: serde_json::Value) -> QueuedAction {
        let action = QueuedAction::new(kind, payload);
        self.enqueue_action(action.clone()).await;
        action
    }

    /// Queues an already built action. Storage errors are logged.
    pub async fn enqueue_action(&self, action: QueuedAction) {
        match self.repo.append(&action).await {
            Ok(queued) => info!(
                action_id = %action.id,
                kind = %action.kind,
                queued,
                "Action queued for replay"
            ),
            Err(e) => error!(
                action_id = %action.id,
                kind = %action.kind,
                error = %e,
                "Failed to queue action"
            ),
        }
    }

    /// Runs one replay pass through `dispatcher`.
    ///
    /// Waits for any pass already running to finish first.
    pub async fn replay(&self, dispatcher: &dyn ActionDispatcher) -> ReplayReport {
        let _pass = self.replay_lock.lock().await;

        let snapshot = match self.repo.load().await {
            Ok(actions) => actions,
            Err(e) => {
                error!(error = %e, "Failed to read pending actions, skipping replay");
                return ReplayReport::default();
            }
        };

        let mut report = ReplayReport {
            attempted: snapshot.len(),
            ..Default::default()
        };
        if snapshot.is_empty() {
            debug!("No pending actions to replay");
            return report;
        }

        info!(count = snapshot.len(), "Replaying pending actions");

        let mut done = Vec::with_capacity(snapshot.len());
        for action in &snapshot {
            match dispatcher.dispatch(action).await {
                Ok(()) => {
                    debug!(action_id = %action.id, kind = %action.kind, "Action replayed");
                    report.succeeded += 1;
                    done.push(action.id.clone());
                }
                Err(e) if self.requeue_on_connectivity_error && e.is_connectivity() => {
                    warn!(
                        action_id = %action.id,
                        kind = %action.kind,
                        error = %e,
                        "Replay lost the connection, keeping action queued"
                    );
                    report.requeued += 1;
                }
                Err(e) => {
                    warn!(
                        action_id = %action.id,
                        kind = %action.kind,
                        error = %e,
                        "Failed to replay action, dropping it"
                    );
                    if let Err(db) = self.repo.record_failure(action, &e.to_string()).await {
                        error!(action_id = %action.id, error = %db, "Failed to record dropped action");
                    }
                    report.failed += 1;
                    done.push(action.id.clone());
                }
            }
        }

        if let Err(e) = self.repo.remove_ids(&done).await {
            error!(error = %e, "Failed to remove replayed actions");
        }

        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            requeued = report.requeued,
            "Replay pass finished"
        );
        report
    }

    /// Returns once no replay pass is running.
    pub async fn wait_for_replay(&self) {
        drop(self.replay_lock.lock().await);
    }

    /// Queued actions, oldest first.
    pub async fn pending(&self) -> SyncResult<Vec<QueuedAction>> {
        Ok(self.repo.load().await?)
    }

    pub async fn len(&self) -> SyncResult<usize> {
        Ok(self.repo.count().await?)
    }

    pub async fn is_empty(&self) -> SyncResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// Actions dropped by earlier replay passes.
    pub async fn failed(&self) -> SyncResult<Vec<FailedAction>> {
        Ok(self.repo.failed().await?)
    }

    pub async fn clear_failed(&self) -> SyncResult<()> {
        Ok(self.repo.clear_failed().await?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use till_db::MemoryStore;

    /// Records dispatched payloads; fails those whose `n` is listed.
    #[derive(Default)]
    struct Recorder {
        seen: StdMutex<Vec<i64>>,
        reject: Vec<i64>,
        unreachable: Vec<i64>,
    }

    impl Recorder {
        fn seen(&self) -> Vec<i64> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ActionDispatcher for Recorder {
        async fn dispatch(&self, action: &QueuedAction) -> SyncResult<()> {
            let n = action.payload["n"].as_i64().unwrap();
            self.seen.lock().unwrap().push(n);
            if self.reject.contains(&n) {
                return Err(SyncError::Http {
                    status: 422,
                    body: "rejected".into(),
                });
            }
            if self.unreachable.contains(&n) {
                return Err(SyncError::ConnectionFailed("reset".into()));
            }
            Ok(())
        }
    }

    fn queue() -> OfflineQueue {
        OfflineQueue::new(Arc::new(MemoryStore::new()))
    }

    async fn enqueue_n(queue: &OfflineQueue, ns: &[i64]) {
        for n in ns {
            queue.enqueue(ActionKind::CreateSale, json!({ "n": n })).await;
        }
    }

    #[tokio::test]
    async fn test_replay_in_order_once() {
        let queue = queue();
        enqueue_n(&queue, &[1, 2, 3]).await;

        let recorder = Recorder::default();
        let report = queue.replay(&recorder).await;

        assert_eq!(recorder.seen(), vec![1, 2, 3]);
        assert_eq!(report.succeeded, 3);
        assert!(report.is_clean());
        assert!(queue.is_empty().await.unwrap());

        // A second pass has nothing to send
        let report = queue.replay(&recorder).await;
        assert_eq!(report.attempted, 0);
        assert_eq!(recorder.seen(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_pass() {
        let queue = queue();
        enqueue_n(&queue, &[1, 2, 3]).await;

        let recorder = Recorder {
            reject: vec![2],
            ..Default::default()
        };
        let report = queue.replay(&recorder).await;

        assert_eq!(recorder.seen(), vec![1, 2, 3]);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert!(queue.is_empty().await.unwrap());

        let failed = queue.failed().await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].action.payload["n"], 2);
        assert!(failed[0].error.contains("422"));

        queue.clear_failed().await.unwrap();
        assert!(queue.failed().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connectivity_failure_dropped_by_default() {
        let queue = queue();
        enqueue_n(&queue, &[1]).await;

        let recorder = Recorder {
            unreachable: vec![1],
            ..Default::default()
        };
        let report = queue.replay(&recorder).await;

        assert_eq!(report.failed, 1);
        assert!(queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_requeue_keeps_position() {
        let queue = queue().with_requeue_on_connectivity_error(true);
        enqueue_n(&queue, &[1, 2, 3]).await;

        let recorder = Recorder {
            unreachable: vec![2],
            reject: vec![3],
            ..Default::default()
        };
        let report = queue.replay(&recorder).await;

        assert_eq!(report.requeued, 1);
        assert_eq!(report.failed, 1);
        let pending = queue.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].payload["n"], 2);
    }

    /// Enqueues a new action from inside the first dispatch.
    struct EnqueuingDispatcher {
        queue: OfflineQueue,
        seen: StdMutex<Vec<i64>>,
    }

    #[async_trait]
    impl ActionDispatcher for EnqueuingDispatcher {
        async fn dispatch(&self, action: &QueuedAction) -> SyncResult<()> {
            let n = action.payload["n"].as_i64().unwrap();
            let first = {
                let mut seen = self.seen.lock().unwrap();
                seen.push(n);
                seen.len() == 1
            };
            if first {
                self.queue
                    .enqueue(ActionKind::AdjustInventory, json!({ "n": 99 }))
                    .await;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_action_enqueued_during_replay_survives() {
        let queue = queue();
        enqueue_n(&queue, &[1, 2]).await;

        let dispatcher = EnqueuingDispatcher {
            queue: queue.clone(),
            seen: StdMutex::new(Vec::new()),
        };
        let report = queue.replay(&dispatcher).await;
        assert_eq!(report.attempted, 2);

        let pending = queue.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].payload["n"], 99);

        queue.replay(&dispatcher).await;
        assert_eq!(*dispatcher.seen.lock().unwrap(), vec![1, 2, 99]);
        assert!(queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_passes_do_not_double_send() {
        let queue = queue();
        enqueue_n(&queue, &[1, 2, 3]).await;

        let recorder = Arc::new(Recorder::default());
        let (a, b) = tokio::join!(queue.replay(recorder.as_ref()), queue.replay(recorder.as_ref()));

        assert_eq!(a.succeeded + b.succeeded, 3);
        assert_eq!(recorder.seen(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_enqueue_stores_wire_shape() {
        let store = Arc::new(MemoryStore::new());
        let queue = OfflineQueue::new(store.clone());
        queue
            .enqueue(ActionKind::UpdateCash, json!({"amount": 50.0}))
            .await;

        let raw = store.get("pendingActions").await.unwrap().unwrap();
        let stored: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored[0]["type"], "UPDATE_CASH");
        assert_eq!(stored[0]["data"]["amount"], 50.0);
    }
}
