//! Core types: constants, errors, identities, and the transport boundary.

pub mod constants;

mod error;
mod identity;
mod link;

pub use error::*;
pub use identity::*;
pub use link::*;
