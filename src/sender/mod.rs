//! Sender-side ARQ engine.
//!
//! Chunks a transaction, then negotiates it chunk by chunk with the relay:
//! stop-and-wait, bounded retries, a distinct terminal outcome per failure
//! mode.

mod chunker;
mod driver;
mod transfer;

pub use chunker::*;
pub use driver::*;
pub use transfer::*;
