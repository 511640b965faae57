//! # Error Types
//!
//! Domain-specific error types for till-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  till-core errors (this file)                                          │
//! │  └── CoreError        - Payload/kind mismatches, JSON failures          │
//! │                                                                         │
//! │  till-db errors (separate crate)                                       │
//! │  └── DbError          - Store operation failures                       │
//! │                                                                         │
//! │  till-client errors (separate crate)                                   │
//! │  └── SyncError        - Network, HTTP, config, replay failures         │
//! │                                                                         │
//! │  Flow: CoreError → DbError / SyncError → register log                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A queued action's payload does not decode as its kind's payload type.
    ///
    /// ## When This Occurs
    /// - The pending list was written by an older client with another shape
    /// - The stored JSON was edited by hand
    #[error("Payload for {kind} is invalid: {reason}")]
    InvalidPayload { kind: String, reason: String },

    /// An action type tag that this client does not know.
    #[error("Unknown action kind: {0}")]
    UnknownActionKind(String),

    /// Serializing a payload to JSON failed.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InvalidPayload {
            kind: "UPDATE_CASH".to_string(),
            reason: "missing field `amount`".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Payload for UPDATE_CASH is invalid: missing field `amount`"
        );

        let err = CoreError::UnknownActionKind("REFUND".to_string());
        assert_eq!(err.to_string(), "Unknown action kind: REFUND");
    }

    #[test]
    fn test_json_error_converts() {
        let json_err = serde_json::from_str::<u32>("nope").unwrap_err();
        let err: CoreError = json_err.into();
        assert!(matches!(err, CoreError::Serialization(_)));
    }
}
