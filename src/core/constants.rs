//! Protocol constants.
//!
//! Defaults for the wire format, the ARQ timing, and the broadcast backend.
//! Config structs take these as their starting values; the wire-format
//! constants are fixed by the protocol and MUST NOT be changed.

use std::time::Duration;

// =============================================================================
// WIRE FORMAT
// =============================================================================

/// Maximum bytes of one transport text message.
///
/// The mesh radio delivers short text payloads; every encoded protocol line
/// must fit within this budget.
pub const MAX_TEXT_BYTES: usize = 200;

/// Hex characters of transaction payload carried per chunk.
///
/// Leaves headroom under [`MAX_TEXT_BYTES`] for the `BTC_TX` framing
/// (type tag, session id, index/total counter, delimiters).
pub const CHUNK_HEX_CHARS: usize = 170;

/// Length of a generated session id (lowercase hex characters).
pub const SESSION_ID_HEX_CHARS: usize = 12;

/// Marker appended to a truncated detail string.
pub const TRUNCATION_MARKER: &str = "...";

// =============================================================================
// SENDER ARQ TIMING
// =============================================================================

/// How long the sender waits for a reply to one chunk.
pub const CHUNK_ACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause before resending a chunk after an explicit NACK.
pub const NACK_BACKOFF: Duration = Duration::from_secs(10);

/// Attempts per chunk before the transfer aborts.
pub const MAX_CHUNK_ATTEMPTS: u32 = 3;

/// How long the sender waits for the final broadcast verdict.
///
/// Twice the per-chunk timeout: the relay may be retrying a flaky backend.
pub const BROADCAST_WAIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Waits for the final verdict before giving up without a confirmation.
pub const MAX_BROADCAST_WAITS: u32 = 3;

// =============================================================================
// RELAY REASSEMBLY
// =============================================================================

/// A session untouched for this long is stale and gets swept.
pub const REASSEMBLY_TIMEOUT: Duration = Duration::from_secs(300);

/// Dispatcher housekeeping tick.
pub const SWEEP_TICK: Duration = Duration::from_secs(1);

/// Minimum interval between actual stale sweeps.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(10);

// =============================================================================
// BROADCAST BACKEND
// =============================================================================

/// Attempts against the backend on connection-level failures.
pub const RPC_MAX_ATTEMPTS: u32 = 3;

/// Delay between backend connection attempts.
pub const RPC_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Per-attempt RPC timeout.
pub const RPC_TIMEOUT: Duration = Duration::from_secs(30);
