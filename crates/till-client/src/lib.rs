//! # till-client: Offline-First Backend Client for Tillpoint
//!
//! This crate keeps the register working while the backend is unreachable:
//! reads fall back to cached responses, mutations are queued durably and
//! replayed once connectivity returns.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Offline-First Client                              │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                          ApiClient                               │  │
//! │  │                                                                  │  │
//! │  │  read(path) ───► GET ──► ResponseCache (store / offline fallback)│  │
//! │  │  submit(mutation)                                                │  │
//! │  │     online  ───► POST ──► backend                                │  │
//! │  │     offline ───► OfflineQueue::enqueue                           │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ Connectivity   │  │  OfflineQueue  │  │  SyncAgent             │    │
//! │  │ Monitor/Probe  │  │                │  │                        │    │
//! │  │                │  │ pendingActions │  │ offline → online:      │    │
//! │  │ watch channel, │  │ in the local   │  │ replay the queue       │    │
//! │  │ backoff        │  │ store, FIFO    │  │ through ApiClient      │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │ BarcodeScanner: keyboard broadcast → ScanDecoder → ScanEvent    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`agent`] - `SyncAgent` replaying the queue on reconnect
//! - [`cache`] - Last-good response cache with offline fallback
//! - [`client`] - `ApiClient` for the backend REST API
//! - [`config`] - Register configuration (device, backend, offline, scanner)
//! - [`connectivity`] - Online/offline state and the background probe
//! - [`error`] - Client error types
//! - [`queue`] - Durable offline action queue and replay
//! - [`scanner`] - Barcode scanner sessions over a keyboard stream
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use till_db::KeyValueStore;
//! use till_client::{ApiClient, ClientConfig, ConnectivityMonitor, OfflineQueue, ResponseCache, SyncAgent};
//!
//! let config = ClientConfig::load_or_default(None);
//! let monitor = ConnectivityMonitor::default();
//! let store: Arc<dyn KeyValueStore> = Arc::new(database.store());
//!
//! let cache = ResponseCache::new(store.clone(), monitor.clone());
//! let queue = OfflineQueue::new(store);
//! let client = ApiClient::new(&config, monitor.clone(), cache, queue.clone())?;
//!
//! let agent = SyncAgent::new(monitor, queue, Arc::new(client.clone())).start();
//! let status = agent.status().await;
//! println!("Pending: {}", status.pending_count);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod cache;
pub mod client;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod queue;
pub mod scanner;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::{NoOpEmitter, SyncAgent, SyncAgentHandle, SyncEventEmitter, SyncStatus};
pub use cache::ResponseCache;
pub use client::{endpoints, ApiClient, SubmitOutcome};
pub use config::{ApiSettings, ClientConfig, DeviceConfig, OfflineSettings, ScannerSettings};
pub use connectivity::{ConnectivityMonitor, ConnectivityProbe, ProbeHandle};
pub use error::{SyncError, SyncResult};
pub use queue::{ActionDispatcher, OfflineQueue, ReplayReport};
pub use scanner::{
    BarcodeScanner, KeyEvent, KeyboardEvents, ScanEvent, ScanSource, ScannerSession,
};
