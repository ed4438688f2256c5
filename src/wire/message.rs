//! Protocol message types and their line codec.
//!
//! Wire format (pipe-delimited ASCII, one line per transport message):
//!
//! ```text
//! BTC_TX|<session_id>|<index>/<total>|<hex_payload>
//! BTC_CHUNK_ACK|<session_id>|<index>|OK|REQUEST_CHUNK|<next_index>
//! BTC_CHUNK_ACK|<session_id>|<index>|OK|ALL_CHUNKS_RECEIVED
//! BTC_NACK|<session_id>|ERROR|<detail>
//! BTC_SESSION_ABORT|<session_id>|<reason>
//! BTC_ACK|<session_id>|SUCCESS|TXID:<txid>
//! ```

use thiserror::Error;

use crate::core::SessionId;
use crate::core::constants::{MAX_TEXT_BYTES, TRUNCATION_MARKER};

/// What the relay asks for in a chunk acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDirective {
    /// Send the chunk with this index next.
    RequestChunk(u32),
    /// Every chunk has arrived; await the broadcast verdict.
    AllChunksReceived,
}

/// One protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// One ordered fragment of a transaction's hex encoding.
    Chunk {
        /// Transfer this chunk belongs to.
        session: SessionId,
        /// 1-based position within the transfer.
        index: u32,
        /// Total chunks in the transfer.
        total: u32,
        /// Hex payload carried by this chunk.
        payload: String,
    },

    /// Positive acknowledgment of one chunk.
    ChunkAck {
        /// Transfer being acknowledged.
        session: SessionId,
        /// Index of the acknowledged chunk.
        index: u32,
        /// What the relay wants next.
        directive: AckDirective,
    },

    /// Negative acknowledgment, any stage.
    Nack {
        /// Transfer being rejected.
        session: SessionId,
        /// Short reason, already within the transport budget.
        detail: String,
    },

    /// Either party terminates the transfer.
    Abort {
        /// Transfer being terminated.
        session: SessionId,
        /// Why.
        reason: String,
    },

    /// Final broadcast success with the transaction id.
    BroadcastAck {
        /// Completed transfer.
        session: SessionId,
        /// Transaction id reported by the backend.
        txid: String,
    },
}

/// Wire codec errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    /// The line does not parse as any protocol message.
    ///
    /// Carries the raw text for local diagnostics.
    #[error("invalid message format ({reason}): {line:?}")]
    InvalidFormat {
        /// What failed to parse.
        reason: String,
        /// The offending line, verbatim.
        line: String,
    },
}

impl WireError {
    fn invalid(reason: impl Into<String>, line: &str) -> Self {
        Self::InvalidFormat {
            reason: reason.into(),
            line: line.to_string(),
        }
    }
}

impl Message {
    /// The session this message belongs to.
    pub fn session(&self) -> &SessionId {
        match self {
            Message::Chunk { session, .. }
            | Message::ChunkAck { session, .. }
            | Message::Nack { session, .. }
            | Message::Abort { session, .. }
            | Message::BroadcastAck { session, .. } => session,
        }
    }

    /// Parse one protocol line.
    pub fn parse(line: &str) -> Result<Self, WireError> {
        let fields: Vec<&str> = line.split('|').collect();

        let session = match fields.get(1) {
            Some(s) if !s.is_empty() => SessionId::new(*s),
            _ => return Err(WireError::invalid("missing session id", line)),
        };

        match fields[0] {
            "BTC_TX" => {
                if fields.len() != 4 {
                    return Err(WireError::invalid("chunk needs 4 fields", line));
                }
                let (index, total) = parse_counter(fields[2], line)?;
                let payload = fields[3];
                if payload.is_empty() || !payload.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return Err(WireError::invalid("payload is not hex", line));
                }
                Ok(Message::Chunk {
                    session,
                    index,
                    total,
                    payload: payload.to_string(),
                })
            }

            "BTC_CHUNK_ACK" => {
                if fields.len() < 5 {
                    return Err(WireError::invalid("chunk ack needs 5+ fields", line));
                }
                let index = parse_index(fields[2], line)?;
                if fields[3] != "OK" {
                    return Err(WireError::invalid("chunk ack status is not OK", line));
                }
                let directive = match (fields[4], fields.len()) {
                    ("ALL_CHUNKS_RECEIVED", 5) => AckDirective::AllChunksReceived,
                    ("REQUEST_CHUNK", 6) => AckDirective::RequestChunk(parse_index(fields[5], line)?),
                    _ => return Err(WireError::invalid("unknown ack directive", line)),
                };
                Ok(Message::ChunkAck {
                    session,
                    index,
                    directive,
                })
            }

            "BTC_NACK" => {
                if fields.len() < 4 || fields[2] != "ERROR" {
                    return Err(WireError::invalid("nack needs ERROR marker and detail", line));
                }
                // Detail may itself contain pipes
                Ok(Message::Nack {
                    session,
                    detail: fields[3..].join("|"),
                })
            }

            "BTC_SESSION_ABORT" => {
                if fields.len() < 3 {
                    return Err(WireError::invalid("abort needs a reason", line));
                }
                Ok(Message::Abort {
                    session,
                    reason: fields[2..].join("|"),
                })
            }

            "BTC_ACK" => {
                if fields.len() != 4 || fields[2] != "SUCCESS" {
                    return Err(WireError::invalid("ack needs SUCCESS marker and txid", line));
                }
                let txid = fields[3]
                    .strip_prefix("TXID:")
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| WireError::invalid("missing TXID prefix", line))?;
                Ok(Message::BroadcastAck {
                    session,
                    txid: txid.to_string(),
                })
            }

            other => Err(WireError::invalid(format!("unknown type {other:?}"), line)),
        }
    }

    /// Serialize to one protocol line.
    ///
    /// Never exceeds [`MAX_TEXT_BYTES`]: free-text details are truncated with
    /// a trailing [`TRUNCATION_MARKER`]. Fixed-form messages are bounded by
    /// construction (the chunker sizes payloads under the budget).
    pub fn encode(&self) -> String {
        let line = match self {
            Message::Chunk {
                session,
                index,
                total,
                payload,
            } => format!("BTC_TX|{session}|{index}/{total}|{payload}"),

            Message::ChunkAck {
                session,
                index,
                directive,
            } => match directive {
                AckDirective::RequestChunk(next) => {
                    format!("BTC_CHUNK_ACK|{session}|{index}|OK|REQUEST_CHUNK|{next}")
                }
                AckDirective::AllChunksReceived => {
                    format!("BTC_CHUNK_ACK|{session}|{index}|OK|ALL_CHUNKS_RECEIVED")
                }
            },

            Message::Nack { session, detail } => {
                let prefix = format!("BTC_NACK|{session}|ERROR|");
                return fit_detail(prefix, detail);
            }

            Message::Abort { session, reason } => {
                let prefix = format!("BTC_SESSION_ABORT|{session}|");
                return fit_detail(prefix, reason);
            }

            Message::BroadcastAck { session, txid } => {
                format!("BTC_ACK|{session}|SUCCESS|TXID:{txid}")
            }
        };

        debug_assert!(line.len() <= MAX_TEXT_BYTES);
        line
    }
}

fn parse_index(field: &str, line: &str) -> Result<u32, WireError> {
    let value: u32 = field
        .parse()
        .map_err(|_| WireError::invalid(format!("bad index {field:?}"), line))?;
    if value == 0 {
        return Err(WireError::invalid("index must be >= 1", line));
    }
    Ok(value)
}

fn parse_counter(field: &str, line: &str) -> Result<(u32, u32), WireError> {
    let (index, total) = field
        .split_once('/')
        .ok_or_else(|| WireError::invalid("counter is not <index>/<total>", line))?;
    let index = parse_index(index, line)?;
    let total: u32 = total
        .parse()
        .map_err(|_| WireError::invalid(format!("bad total {total:?}"), line))?;
    if total == 0 {
        return Err(WireError::invalid("total must be >= 1", line));
    }
    if index > total {
        return Err(WireError::invalid(
            format!("index {index} out of range 1..={total}"),
            line,
        ));
    }
    Ok((index, total))
}

/// Append a detail string to a prefix, truncating to the transport budget.
fn fit_detail(prefix: String, detail: &str) -> String {
    let budget = MAX_TEXT_BYTES.saturating_sub(prefix.len());
    if detail.len() <= budget {
        return prefix + detail;
    }

    let mut cut = budget.saturating_sub(TRUNCATION_MARKER.len());
    while cut > 0 && !detail.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut line = prefix;
    line.push_str(&detail[..cut]);
    line.push_str(TRUNCATION_MARKER);
    line
}
