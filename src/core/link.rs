//! Transport boundary types.
//!
//! The radio driver is external: it delivers inbound messages on a bounded
//! channel and consumes outbound messages from another. Delivery is
//! best-effort, unordered, and lossy; the ARQ layers above are what make a
//! transfer reliable.

use super::identity::NodeId;

/// Transport-level classification of an inbound message.
///
/// Only [`MessageKind::Text`] carries protocol traffic; everything else is
/// filtered as unrelated mesh chatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// A direct text message.
    Text,
    /// Position beacon.
    Position,
    /// Device telemetry.
    Telemetry,
    /// Anything else the mesh carries.
    Other,
}

/// One message delivered by the radio transport.
#[derive(Debug, Clone)]
pub struct Inbound {
    /// Originating node.
    pub from: NodeId,
    /// Addressed node.
    pub to: NodeId,
    /// Raw text payload.
    pub text: String,
    /// Transport classification.
    pub kind: MessageKind,
}

impl Inbound {
    /// Create a direct text message.
    pub fn text(from: impl Into<NodeId>, to: impl Into<NodeId>, text: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            text: text.into(),
            kind: MessageKind::Text,
        }
    }
}

/// One message handed to the radio transport for best-effort delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    /// Destination node.
    pub to: NodeId,
    /// Text payload, already within the transport budget.
    pub text: String,
}

impl Outbound {
    /// Create an outbound text message.
    pub fn new(to: impl Into<NodeId>, text: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            text: text.into(),
        }
    }
}
