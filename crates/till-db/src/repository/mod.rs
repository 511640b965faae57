//! # Repository Module
//!
//! Typed views over the key-value store.
//!
//! ```text
//! PendingActionRepository  ──┐
//!                            ├──► Arc<dyn KeyValueStore> ──► SqliteStore | MemoryStore
//! ResponseCacheRepository  ──┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`kv::SqliteStore`] - The `local_store` table as a [`crate::KeyValueStore`]
//! - [`queue::PendingActionRepository`] - Pending action list and failure record
//! - [`cache::ResponseCacheRepository`] - Cached read responses

pub mod cache;
pub mod kv;
pub mod queue;
