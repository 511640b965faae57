//! # till-db: Local Store for Tillpoint
//!
//! Everything the register keeps across restarts: the pending action list,
//! the failure record and the cached read responses. All of it lives in a
//! single SQLite key-value table.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tillpoint Data Flow                              │
//! │                                                                         │
//! │  till-client (OfflineQueue, ResponseCache)                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     till-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────────┐  ┌────────────┐  │   │
//! │  │   │   Database    │    │  Repositories      │  │ Migrations │  │   │
//! │  │   │   (pool.rs)   │    │                    │  │ (embedded) │  │   │
//! │  │   │               │    │ PendingActionRepo  │  │            │  │   │
//! │  │   │ SqlitePool    │◄───│ ResponseCacheRepo  │  │ 001_local_ │  │   │
//! │  │   │ SqliteStore   │    │                    │  │  store.sql │  │   │
//! │  │   └───────────────┘    └────────────────────┘  └────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │   SQLite: <data dir>/till.db   table local_store(key, value)   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use till_db::{Database, DbConfig, PendingActionRepository};
//!
//! let db = Database::new(DbConfig::new("till.db")).await?;
//! let queue = PendingActionRepository::new(Arc::new(db.store()));
//! let pending = queue.load().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use store::{KeyValueStore, MemoryStore};

pub use repository::cache::ResponseCacheRepository;
pub use repository::kv::SqliteStore;
pub use repository::queue::PendingActionRepository;
