//! Error taxonomy for the settlement engine.
//!
//! Every fallible operation in the engine returns one of these kinds. The API
//! layer maps them onto HTTP status codes; callers treat `LockTimeout` and
//! `Persistence` as retryable and surface everything else verbatim.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input, rejected before it reaches the state machine.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A debit would drive the user's balance negative.
    #[error("Insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: Decimal, required: Decimal },

    /// A transition was attempted from a state that forbids it. Includes
    /// lost races: the loser of a reveal/cash-out race observes the new
    /// state and gets this error instead of a silent no-op.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Tile index out of range or already revealed.
    #[error("Invalid tile {tile}: {reason}")]
    InvalidTile { tile: u8, reason: String },

    /// Lock contention exceeded the configured bound. Retryable.
    #[error("Lock on {key} not acquired within {timeout_ms}ms")]
    LockTimeout { key: String, timeout_ms: u64 },

    /// Referenced entity does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backing store unavailable or write rejected. Retryable; settlement
    /// never partially applies across a persistence failure.
    #[error("Persistence failure: {0}")]
    Persistence(String),
}

impl EngineError {
    /// Whether the caller may retry the operation with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::LockTimeout { .. } | EngineError::Persistence(_)
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        let timeout = EngineError::LockTimeout {
            key: "game:abc".to_string(),
            timeout_ms: 250,
        };
        assert!(timeout.is_retryable());
        assert!(EngineError::Persistence("store down".to_string()).is_retryable());
        assert!(!EngineError::Validation("bad grid".to_string()).is_retryable());
        assert!(!EngineError::InvalidState("already settled".to_string()).is_retryable());
    }

    #[test]
    fn display_includes_context() {
        let err = EngineError::InvalidTile {
            tile: 30,
            reason: "index out of range for grid of 25".to_string(),
        };
        assert!(err.to_string().contains("30"));
        assert!(err.to_string().contains("out of range"));
    }
}
