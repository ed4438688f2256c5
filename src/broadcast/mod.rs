//! Transaction broadcast backend.
//!
//! The relay hands a reassembled transaction to a backend that submits it to
//! the Bitcoin network. The boundary is synchronous: one call may block for
//! the configured per-attempt timeout times the retry budget. Async callers
//! run it on a blocking thread.

mod reasons;

#[cfg(feature = "rpc")]
mod rpc;

pub use reasons::short_reason;

#[cfg(feature = "rpc")]
#[cfg_attr(docsrs, doc(cfg(feature = "rpc")))]
pub use rpc::{BitcoinRpc, RpcConfig};

use crate::core::BroadcastError;

/// Boundary to the transaction broadcast backend.
pub trait TxBroadcaster: Send + Sync {
    /// Submit a raw transaction hex string; returns the txid on success.
    ///
    /// Connection-level failures are retried internally before surfacing as
    /// [`BroadcastError::Unavailable`]. A backend that answers but rejects
    /// the transaction is terminal: [`BroadcastError::Rejected`], returned
    /// immediately with the backend's raw error text.
    fn broadcast(&self, raw_tx_hex: &str) -> Result<String, BroadcastError>;
}
