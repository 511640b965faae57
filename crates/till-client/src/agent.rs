//! # Sync Agent
//!
//! Background task that replays the offline queue whenever the register
//! comes back online.
//!
//! ## Agent Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SyncAgent Architecture                           │
//! │                                                                         │
//! │  ConnectivityProbe ──set_online──► ConnectivityMonitor (watch)         │
//! │                                            │                            │
//! │                                            │ changed()                  │
//! │                                            ▼                            │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                         SyncAgent task                           │  │
//! │  │                                                                  │  │
//! │  │  offline → online ──► OfflineQueue::replay(dispatcher)           │  │
//! │  │  online  → offline ─► status only                                │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │                               ▼                                         │
//! │  SyncEventEmitter: connectivity / replay started / replay finished     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::connectivity::ConnectivityMonitor;
use crate::error::{SyncError, SyncResult};
use crate::queue::{ActionDispatcher, OfflineQueue, ReplayReport};

// =============================================================================
// Sync Status
// =============================================================================

/// Snapshot of the agent's view for external queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub is_online: bool,

    /// Actions waiting for replay.
    pub pending_count: usize,

    pub last_replay_at: Option<DateTime<Utc>>,

    pub last_report: Option<ReplayReport>,
}

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Receives agent events (a UI layer, a log sink).
pub trait SyncEventEmitter: Send + Sync {
    fn emit_connectivity(&self, online: bool);

    fn emit_replay_started(&self, pending: usize);

    fn emit_replay_finished(&self, report: &ReplayReport);
}

/// No-op event emitter.
pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit_connectivity(&self, _online: bool) {}
    fn emit_replay_started(&self, _pending: usize) {}
    fn emit_replay_finished(&self, _report: &ReplayReport) {}
}

// =============================================================================
// Sync Agent
// =============================================================================

pub struct SyncAgent {
    monitor: ConnectivityMonitor,
    queue: OfflineQueue,
    dispatcher: Arc<dyn ActionDispatcher>,
    emitter: Arc<dyn SyncEventEmitter>,
}

impl SyncAgent {
    pub fn new(
        monitor: ConnectivityMonitor,
        queue: OfflineQueue,
        dispatcher: Arc<dyn ActionDispatcher>,
    ) -> Self {
        Self::with_emitter(monitor, queue, dispatcher, Arc::new(NoOpEmitter))
    }

    pub fn with_emitter(
        monitor: ConnectivityMonitor,
        queue: OfflineQueue,
        dispatcher: Arc<dyn ActionDispatcher>,
        emitter: Arc<dyn SyncEventEmitter>,
    ) -> Self {
        SyncAgent {
            monitor,
            queue,
            dispatcher,
            emitter,
        }
    }

    /// Spawns the agent task.
    ///
    /// If the register starts online with actions left over from an earlier
    /// run, they are replayed right away.
    pub fn start(self) -> SyncAgentHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let last = Arc::new(RwLock::new(LastReplay::default()));

        let monitor = self.monitor.clone();
        let queue = self.queue.clone();
        let mut rx = monitor.subscribe();
        let initially_online = *rx.borrow_and_update();
        let task = tokio::spawn(self.run(rx, initially_online, last.clone(), shutdown_rx));

        info!("Sync agent started");
        SyncAgentHandle {
            shutdown_tx,
            task,
            monitor,
            queue,
            last,
        }
    }

    async fn run(
        self,
        mut rx: watch::Receiver<bool>,
        initially_online: bool,
        last: Arc<RwLock<LastReplay>>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        // Changes made after start() are still pending on `rx`
        let mut was_online = initially_online;

        if was_online {
            match self.queue.is_empty().await {
                Ok(false) => self.replay(&last).await,
                Ok(true) => {}
                Err(e) => warn!(error = %e, "Could not read pending actions at startup"),
            }
        }

        loop {
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        debug!("Connectivity monitor dropped");
                        break;
                    }
                    let online = *rx.borrow_and_update();
                    if online == was_online {
                        continue;
                    }
                    was_online = online;
                    self.emitter.emit_connectivity(online);

                    if online {
                        info!("Back online, replaying pending actions");
                        self.replay(&last).await;
                    } else {
                        info!("Offline, mutations will be queued");
                    }
                }

                _ = shutdown_rx.recv() => {
                    info!("Sync agent received shutdown");
                    break;
                }
            }
        }

        info!("Sync agent stopped");
    }

    async fn replay(&self, last: &RwLock<LastReplay>) {
        let pending = self.queue.len().await.unwrap_or(0);
        self.emitter.emit_replay_started(pending);

        let report = self.queue.replay(self.dispatcher.as_ref()).await;

        self.emitter.emit_replay_finished(&report);
        let mut last = last.write().await;
        last.at = Some(Utc::now());
        last.report = Some(report);
    }
}

#[derive(Debug, Default)]
struct LastReplay {
    at: Option<DateTime<Utc>>,
    report: Option<ReplayReport>,
}

// =============================================================================
// Agent Handle (for external control)
// =============================================================================

/// Handle for querying and stopping a running agent.
pub struct SyncAgentHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
    monitor: ConnectivityMonitor,
    queue: OfflineQueue,
    last: Arc<RwLock<LastReplay>>,
}

impl SyncAgentHandle {
    pub async fn status(&self) -> SyncStatus {
        let pending_count = match self.queue.len().await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Could not count pending actions");
                0
            }
        };
        let last = self.last.read().await;

        SyncStatus {
            is_online: self.monitor.is_online(),
            pending_count,
            last_replay_at: last.at,
            last_report: last.report.clone(),
        }
    }

    /// Stops the agent and waits for it. A replay pass in progress is
    /// finished first.
    pub async fn shutdown(self) -> SyncResult<()> {
        info!("Shutting down sync agent");
        let _ = self.shutdown_tx.send(()).await;
        self.task
            .await
            .map_err(|e| SyncError::ChannelError(format!("Sync agent task failed: {e}")))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use till_core::{ActionKind, QueuedAction};
    use till_db::MemoryStore;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<ActionKind>>,
    }

    #[async_trait]
    impl ActionDispatcher for Recorder {
        async fn dispatch(&self, action: &QueuedAction) -> SyncResult<()> {
            self.seen.lock().unwrap().push(action.kind);
            Ok(())
        }
    }

    /// Signals each finished replay pass.
    #[derive(Default)]
    struct PassSignal {
        finished: Notify,
        switched: Notify,
        connectivity: Mutex<Vec<bool>>,
    }

    impl SyncEventEmitter for PassSignal {
        fn emit_connectivity(&self, online: bool) {
            self.connectivity.lock().unwrap().push(online);
            self.switched.notify_one();
        }
        fn emit_replay_started(&self, _pending: usize) {}
        fn emit_replay_finished(&self, _report: &ReplayReport) {
            self.finished.notify_one();
        }
    }

    fn queue() -> OfflineQueue {
        OfflineQueue::new(Arc::new(MemoryStore::new()))
    }

    async fn wait(signal: &PassSignal) {
        tokio::time::timeout(Duration::from_secs(5), signal.finished.notified())
            .await
            .expect("replay pass did not finish");
    }

    #[tokio::test]
    async fn test_replays_on_reconnect() {
        let monitor = ConnectivityMonitor::new(false);
        let queue = queue();
        queue.enqueue(ActionKind::CreateSale, json!({})).await;
        queue.enqueue(ActionKind::AdjustInventory, json!({})).await;

        let recorder = Arc::new(Recorder::default());
        let signal = Arc::new(PassSignal::default());
        let handle = SyncAgent::with_emitter(
            monitor.clone(),
            queue.clone(),
            recorder.clone(),
            signal.clone(),
        )
        .start();

        let status = handle.status().await;
        assert!(!status.is_online);
        assert_eq!(status.pending_count, 2);

        monitor.set_online(true);
        wait(&signal).await;

        assert_eq!(
            *recorder.seen.lock().unwrap(),
            vec![ActionKind::CreateSale, ActionKind::AdjustInventory]
        );
        let status = handle.status().await;
        assert!(status.is_online);
        assert_eq!(status.pending_count, 0);
        assert_eq!(status.last_report.map(|r| r.succeeded), Some(2));
        assert!(status.last_replay_at.is_some());
        assert_eq!(*signal.connectivity.lock().unwrap(), vec![true]);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_reconnect_before_first_poll_is_reported() {
        let monitor = ConnectivityMonitor::new(false);
        let queue = queue();
        queue.enqueue(ActionKind::UpdateCash, json!({})).await;

        let recorder = Arc::new(Recorder::default());
        let signal = Arc::new(PassSignal::default());
        let handle = SyncAgent::with_emitter(
            monitor.clone(),
            queue.clone(),
            recorder.clone(),
            signal.clone(),
        )
        .start();

        // Single-threaded runtime: the agent task has not been polled yet
        monitor.set_online(true);
        wait(&signal).await;

        assert_eq!(*signal.connectivity.lock().unwrap(), vec![true]);
        assert_eq!(*recorder.seen.lock().unwrap(), vec![ActionKind::UpdateCash]);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_before_first_poll_is_reported() {
        let monitor = ConnectivityMonitor::new(true);
        let signal = Arc::new(PassSignal::default());
        let handle = SyncAgent::with_emitter(
            monitor.clone(),
            queue(),
            Arc::new(Recorder::default()),
            signal.clone(),
        )
        .start();

        monitor.set_online(false);
        tokio::time::timeout(Duration::from_secs(5), signal.switched.notified())
            .await
            .expect("connectivity change not reported");

        assert_eq!(*signal.connectivity.lock().unwrap(), vec![false]);
        assert!(!handle.status().await.is_online);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_startup_replays_leftovers_when_online() {
        let queue = queue();
        queue.enqueue(ActionKind::UpdateCash, json!({})).await;

        let recorder = Arc::new(Recorder::default());
        let signal = Arc::new(PassSignal::default());
        let handle = SyncAgent::with_emitter(
            ConnectivityMonitor::new(true),
            queue.clone(),
            recorder.clone(),
            signal.clone(),
        )
        .start();

        wait(&signal).await;
        assert_eq!(*recorder.seen.lock().unwrap(), vec![ActionKind::UpdateCash]);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_offline_cash_withdrawal_reaches_backend_after_reconnect() {
        use crate::cache::ResponseCache;
        use crate::client::ApiClient;
        use crate::config::ClientConfig;
        use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
        use serde_json::Value;
        use till_core::{CashUpdate, Mutation};

        type Log = Arc<Mutex<Vec<Value>>>;
        let log = Log::default();
        let router = Router::new()
            .route(
                "/api/cash-in-hand",
                post(|State(log): State<Log>, Json(body): Json<Value>| async move {
                    log.lock().unwrap().push(body);
                    StatusCode::NO_CONTENT
                }),
            )
            .with_state(log.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let mut config = ClientConfig::default();
        config.api.base_url = format!("http://{addr}");

        let store = Arc::new(MemoryStore::new());
        let monitor = ConnectivityMonitor::new(false);
        let queue = OfflineQueue::new(store.clone());
        let client = ApiClient::new(
            &config,
            monitor.clone(),
            ResponseCache::new(store, monitor.clone()),
            queue.clone(),
        )
        .unwrap();

        let outcome = client
            .submit(&Mutation::UpdateCash(CashUpdate::withdrawal(50.0, "Error correction")))
            .await
            .unwrap();
        assert!(outcome.is_queued());
        assert!(log.lock().unwrap().is_empty());

        let signal = Arc::new(PassSignal::default());
        let handle = SyncAgent::with_emitter(
            monitor.clone(),
            queue.clone(),
            Arc::new(client),
            signal.clone(),
        )
        .start();

        monitor.set_online(true);
        wait(&signal).await;

        assert_eq!(
            *log.lock().unwrap(),
            vec![json!({"amount": 50.0, "type": "withdrawal", "reason": "Error correction"})]
        );
        assert!(queue.is_empty().await.unwrap());
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_going_offline_does_not_replay() {
        let monitor = ConnectivityMonitor::new(true);
        let queue = queue();
        let recorder = Arc::new(Recorder::default());
        let handle = SyncAgent::new(monitor.clone(), queue.clone(), recorder.clone()).start();

        monitor.set_online(false);
        queue.enqueue(ActionKind::CreateSale, json!({})).await;
        tokio::task::yield_now().await;

        assert!(recorder.seen.lock().unwrap().is_empty());
        assert_eq!(handle.status().await.pending_count, 1);
        handle.shutdown().await.unwrap();
    }
}
