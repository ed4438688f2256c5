//! Error types shared across protocol layers.

use thiserror::Error;

/// Failures reported by the transaction broadcast backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BroadcastError {
    /// The backend accepted the call but rejected the transaction.
    ///
    /// Terminal: carries the backend's raw error text, which stays in local
    /// diagnostics. Only a mapped short reason crosses the wire.
    #[error("broadcast rejected: {0}")]
    Rejected(String),

    /// The backend could not be reached after the retry budget.
    #[error("broadcast backend unavailable: {0}")]
    Unavailable(String),
}

/// Errors that terminate a relay dispatcher run.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The outbound transport channel closed; no reply can be delivered.
    #[error("outbound transport channel closed")]
    OutboundClosed,
}
