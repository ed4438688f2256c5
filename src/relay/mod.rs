//! Relay-side dispatcher.
//!
//! Consumes inbound transport messages for one relay identity, drives the
//! reassembly engine, emits acknowledgments, and hands completed
//! transactions to the broadcast backend.

mod dispatcher;

pub use dispatcher::*;
