//! Wire format: pipe-delimited protocol lines.
//!
//! ASCII text, one protocol message per transport message. Parsing is
//! defensive: a malformed line becomes a typed error, never a panic.

mod message;

pub use message::*;
