//! Receiver-side reassembly.
//!
//! Accumulates chunks per `(sender, session)` pair until a transfer is
//! complete, then hands back the reassembled transaction hex. Sessions that
//! go quiet are swept after an inactivity timeout.

mod engine;

pub use engine::*;
