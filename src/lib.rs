//! # MESHTX Protocol
//!
//! Reliable transfer of Bitcoin raw transactions across a long-range,
//! low-bandwidth packet radio mesh. The transport delivers ~200-byte text
//! messages, unordered and lossy; MESHTX rides a stop-and-wait ARQ stream on
//! top of it:
//!
//! - **Sender**: splits a transaction's hex into ordered chunks and
//!   negotiates them one at a time - send, wait, retry, abort.
//! - **Relay**: reassembles chunks per session, acknowledges each one, and
//!   submits the completed transaction to a Bitcoin node over JSON-RPC.
//! - **Exactly one chunk in flight**: no pipelining, no forward error
//!   correction; acknowledgment and retransmission do all the work.
//!
//! ## Feature Flags
//!
//! - `sender` (default): sender-side ARQ engine
//! - `relay` (default): relay-side dispatcher
//! - `rpc` (default): Bitcoin Core JSON-RPC broadcast client
//!
//! ## Modules
//!
//! - [`core`]: Constants, errors, identities, transport boundary (always included)
//! - [`wire`]: Pipe-delimited protocol line codec (always included)
//! - [`reassembly`]: Receiver-side session store (always included)
//! - [`sender`]: Sender ARQ engine (requires `sender` feature)
//! - [`relay`]: Relay dispatcher (requires `relay` feature)
//! - [`broadcast`]: Broadcast backend boundary (client requires `rpc` feature)
//!
//! ## Example Usage
//!
//! ```rust
//! use meshtx_protocol::prelude::*;
//!
//! // The relay reassembles whatever order the mesh delivers
//! let mut engine = ReassemblyEngine::new();
//! let sender = NodeId::new("!a1b2c3d4");
//! let session = SessionId::new("0123456789ab");
//!
//! engine.add_chunk(&sender, &session, 2, 2, "beef");
//! match engine.add_chunk(&sender, &session, 1, 2, "dead") {
//!     AddOutcome::Completed(tx_hex) => assert_eq!(tx_hex, "deadbeef"),
//!     other => panic!("expected completion, got {other:?}"),
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Wire codec (always included)
pub mod wire;

// Receiver-side reassembly (always included)
pub mod reassembly;

// Broadcast boundary (client feature-gated inside)
pub mod broadcast;

// Sender ARQ engine (feature-gated)
#[cfg(feature = "sender")]
#[cfg_attr(docsrs, doc(cfg(feature = "sender")))]
pub mod sender;

// Relay dispatcher (feature-gated)
#[cfg(feature = "relay")]
#[cfg_attr(docsrs, doc(cfg(feature = "relay")))]
pub mod relay;

/// Prelude module for convenient imports.
pub mod prelude {
    // Core types
    pub use crate::core::*;

    // Wire codec
    pub use crate::wire::{AckDirective, Message, WireError};

    // Reassembly
    pub use crate::reassembly::{AddOutcome, ReassemblyEngine, SessionKey, SweptSession};

    // Broadcast boundary
    pub use crate::broadcast::TxBroadcaster;
    #[cfg(feature = "rpc")]
    pub use crate::broadcast::{BitcoinRpc, RpcConfig};

    // Sender (when enabled)
    #[cfg(feature = "sender")]
    pub use crate::sender::{
        Phase, SenderConfig, Step, Transfer, TransferOutcome, run_transfer, split_hex,
    };

    // Relay (when enabled)
    #[cfg(feature = "relay")]
    pub use crate::relay::{Relay, RelayConfig};
}

// Re-export commonly used items at crate root
pub use self::core::{BroadcastError, Inbound, MessageKind, NodeId, Outbound, SessionId};
pub use reassembly::{AddOutcome, ReassemblyEngine};
pub use wire::{Message, WireError};

#[cfg(feature = "sender")]
pub use sender::{SenderConfig, TransferOutcome, run_transfer};

#[cfg(feature = "relay")]
pub use relay::{Relay, RelayConfig};
