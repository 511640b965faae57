//! # Connectivity
//!
//! Tracks whether the backend is reachable and announces transitions.
//!
//! ## Probe Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Connectivity Probe States                            │
//! │                                                                         │
//! │        GET {base_url}{probe_path}                                      │
//! │                 │                                                       │
//! │      any HTTP response         transport error                         │
//! │          ┌──────┴──────┐                                                │
//! │          ▼             ▼                                                │
//! │     ┌─────────┐   ┌──────────┐                                          │
//! │     │ Online  │   │ Offline  │                                          │
//! │     └────┬────┘   └────┬─────┘                                          │
//! │          │             │                                                │
//! │  sleep probe_interval  sleep backoff (interval → … → max, x2)          │
//! │          │             │                                                │
//! │          └──────┬──────┘                                                │
//! │                 ▼                                                       │
//! │             probe again                                                │
//! │                                                                         │
//! │  Only changes of state reach ConnectivityMonitor subscribers.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{SyncError, SyncResult};

// =============================================================================
// Connectivity Monitor
// =============================================================================

/// Shared online/offline flag with change notification.
///
/// Clones share the same state.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_online);
        ConnectivityMonitor { tx: Arc::new(tx) }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Records the current state. Returns true when this was a change;
    /// repeated reports of the same state notify nobody.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        if changed {
            info!(online, "Connectivity changed");
        }
        changed
    }

    /// Subscribes to state changes. The receiver starts at the current
    /// state, marked as seen.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    /// Starts online, matching a freshly booted register that has not
    /// seen a failure yet.
    fn default() -> Self {
        ConnectivityMonitor::new(true)
    }
}

// =============================================================================
// Connectivity Probe
// =============================================================================

/// Periodically checks the backend and feeds the monitor.
pub struct ConnectivityProbe {
    http: reqwest::Client,
    url: Url,
    interval: Duration,
    max_backoff: Duration,
    monitor: ConnectivityMonitor,
}

/// Handle for stopping a running probe.
pub struct ProbeHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl ProbeHandle {
    /// Stops the probe and waits for its task to finish.
    pub async fn shutdown(self) -> SyncResult<()> {
        let _ = self.shutdown_tx.send(()).await;
        self.task
            .await
            .map_err(|e| SyncError::ChannelError(format!("Probe task failed: {e}")))
    }
}

impl ConnectivityProbe {
    pub fn new(config: &ClientConfig, monitor: ConnectivityMonitor) -> SyncResult<Self> {
        let url = config.endpoint_url(&config.offline.probe_path)?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(ConnectivityProbe {
            http,
            url,
            interval: config.probe_interval(),
            max_backoff: config.max_probe_backoff(),
            monitor,
        })
    }

    /// Performs one check and returns whether the backend answered.
    ///
    /// Any status counts as reachable: a 404 or 500 still proves the
    /// network path works.
    pub async fn check_once(&self) -> bool {
        match self.http.get(self.url.clone()).send().await {
            Ok(response) => {
                debug!(status = %response.status(), "Probe answered");
                true
            }
            Err(e) => {
                debug!(error = %e, "Probe failed");
                false
            }
        }
    }

    /// Spawns the probe loop.
    pub fn spawn(self) -> ProbeHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let task = tokio::spawn(self.run(shutdown_rx));
        ProbeHandle { shutdown_tx, task }
    }

    async fn run(self, mut shutdown_rx: mpsc::Receiver<()>) {
        info!(url = %self.url, interval = ?self.interval, "Connectivity probe starting");

        let mut backoff = self.create_backoff();

        loop {
            let online = self.check_once().await;
            self.monitor.set_online(online);

            let wait = if online {
                backoff.reset();
                self.interval
            } else {
                let wait = backoff.next_backoff().unwrap_or(self.max_backoff);
                debug!(?wait, "Backend unreachable, backing off");
                wait
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown_rx.recv() => {
                    info!("Connectivity probe received shutdown");
                    break;
                }
            }
        }

        info!("Connectivity probe stopped");
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.interval,
            max_interval: self.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// Marks the device offline when `err` shows the backend was not reached.
///
/// Lets a failed request report an outage before the next probe does.
pub(crate) fn note_failure(monitor: &ConnectivityMonitor, err: &SyncError) {
    if err.is_connectivity() && monitor.is_online() {
        warn!(error = %err, "Request failed without a response, marking offline");
        monitor.set_online(false);
    }
}
