//! # till-core: Pure Logic for Tillpoint
//!
//! This crate holds the parts of the register that need no I/O: the typed
//! payloads of every mutating backend operation, the queued-action record
//! that carries them through an outage, and the barcode scan decoder.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tillpoint Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 apps/register (orchestration)                   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │   till-client: connectivity, HTTP, cache, replay, scanner I/O   │   │
//! │  └──────────────┬──────────────────────────────────┬───────────────┘   │
//! │                 │                                  │                    │
//! │  ┌──────────────▼──────────────┐   ┌───────────────▼───────────────┐   │
//! │  │ till-db: key-value store,   │   │ ★ till-core (THIS CRATE) ★    │   │
//! │  │ queue + cache repositories  │──►│                               │   │
//! │  └─────────────────────────────┘   │  types   QueuedAction         │   │
//! │                                    │          Mutation payloads    │   │
//! │                                    │  scan    ScanDecoder          │   │
//! │                                    │                               │   │
//! │                                    │  NO I/O • PURE FUNCTIONS      │   │
//! │                                    └───────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Mutation payloads, read models, [`QueuedAction`]
//! - [`scan`] - Keystroke-timing barcode decoder
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use std::time::{Duration, Instant};
//! use till_core::scan::{Key, ScanDecoder};
//!
//! let mut decoder = ScanDecoder::default();
//! let t0 = Instant::now();
//!
//! assert_eq!(decoder.feed(&Key::Char('4'), t0), None);
//! assert_eq!(decoder.feed(&Key::Char('2'), t0 + Duration::from_millis(8)), None);
//! let scan = decoder.feed(&Key::Enter, t0 + Duration::from_millis(16));
//! assert_eq!(scan.as_deref(), Some("42"));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod scan;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult};
pub use scan::{Key, ScanConfig, ScanDecoder};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Longest pause, in milliseconds, between two characters of one hardware scan.
///
/// Scanners inject characters far faster than anyone types; a longer gap
/// means the characters so far came from a person.
pub const DEFAULT_SCAN_GAP_MS: u64 = 50;

/// Storage key of the pending action list.
pub const PENDING_ACTIONS_KEY: &str = "pendingActions";

/// Storage key of the record of actions dropped after a failed replay.
pub const FAILED_ACTIONS_KEY: &str = "failedActions";

/// Prefix for cached read responses (`cache:/api/products`).
pub const CACHE_KEY_PREFIX: &str = "cache:";
