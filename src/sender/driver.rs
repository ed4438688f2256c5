//! Async transfer driver.
//!
//! Runs one transfer as a synchronous sequential loop: send a chunk, block
//! (bounded) on the inbound channel, feed the reply to the state machine,
//! act on its next step. Cancellation is checked at every blocking boundary.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::chunker::split_hex;
use super::transfer::{Step, Transfer, TransferOutcome};
use crate::core::constants::{
    BROADCAST_WAIT_TIMEOUT, CHUNK_ACK_TIMEOUT, CHUNK_HEX_CHARS, MAX_BROADCAST_WAITS,
    MAX_CHUNK_ATTEMPTS, NACK_BACKOFF,
};
use crate::core::{Inbound, MessageKind, NodeId, Outbound, SessionId};
use crate::wire::Message;

/// Sender-side configuration.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Our own mesh identity.
    pub node_id: NodeId,
    /// The relay to transfer to.
    pub relay: NodeId,
    /// Hex characters per chunk.
    pub chunk_hex_chars: usize,
    /// Wait per chunk reply.
    pub ack_timeout: Duration,
    /// Pause before resending after an explicit NACK.
    pub nack_backoff: Duration,
    /// Attempts per chunk.
    pub max_attempts: u32,
    /// Wait per broadcast-verdict attempt.
    pub verdict_timeout: Duration,
    /// Verdict waits before giving up.
    pub max_verdict_waits: u32,
}

impl SenderConfig {
    /// Default timings for a transfer to `relay`.
    pub fn new(node_id: impl Into<NodeId>, relay: impl Into<NodeId>) -> Self {
        Self {
            node_id: node_id.into(),
            relay: relay.into(),
            chunk_hex_chars: CHUNK_HEX_CHARS,
            ack_timeout: CHUNK_ACK_TIMEOUT,
            nack_backoff: NACK_BACKOFF,
            max_attempts: MAX_CHUNK_ATTEMPTS,
            verdict_timeout: BROADCAST_WAIT_TIMEOUT,
            max_verdict_waits: MAX_BROADCAST_WAITS,
        }
    }
}

/// What one bounded wait on the inbound channel produced.
enum Wait {
    Message(Message),
    Timeout,
    Cancelled,
}

/// Transfer one raw transaction to the relay.
///
/// Drives the whole session: chunking, stop-and-wait acknowledgment, the
/// broadcast-verdict wait, and the abort notice when giving up. Returns a
/// distinct [`TransferOutcome`] per terminal state.
///
/// An empty `tx_hex` never opens a session and reports
/// [`TransferOutcome::Rejected`] locally.
pub async fn run_transfer(
    config: &SenderConfig,
    tx_hex: &str,
    session: SessionId,
    outbound: &mpsc::Sender<Outbound>,
    inbound: &mut mpsc::Receiver<Inbound>,
    mut cancel: watch::Receiver<bool>,
) -> TransferOutcome {
    let chunks = split_hex(tx_hex, config.chunk_hex_chars);
    let Ok(total) = u32::try_from(chunks.len()) else {
        return TransferOutcome::Rejected {
            reason: "transaction too large to chunk".to_string(),
        };
    };
    if total == 0 {
        return TransferOutcome::Rejected {
            reason: "empty transaction".to_string(),
        };
    }

    info!(session = %session, total, relay = %config.relay, "starting transfer");

    let mut transfer = Transfer::new(session.clone(), total, config.max_attempts, config.max_verdict_waits);
    let mut step = transfer.start();

    loop {
        match step {
            Step::Send { index, backoff } => {
                if backoff && !sleep_unless_cancelled(config.nack_backoff, &mut cancel).await {
                    return cancel_transfer(config, &session, outbound).await;
                }

                let chunk = Message::Chunk {
                    session: session.clone(),
                    index,
                    total,
                    payload: chunks[(index - 1) as usize].clone(),
                };
                debug!(session = %session, index, total, "sending chunk");
                if send_to_relay(config, outbound, &chunk).await.is_err() {
                    warn!(session = %session, "outbound transport closed mid-transfer");
                    return TransferOutcome::Cancelled;
                }

                step = match next_reply(config, config.ack_timeout, inbound, &mut cancel).await {
                    Wait::Cancelled => return cancel_transfer(config, &session, outbound).await,
                    Wait::Timeout => transfer.on_reply(None),
                    Wait::Message(msg) => transfer.on_reply(Some(&msg)),
                };
            }

            Step::AwaitVerdict => {
                step = match next_reply(config, config.verdict_timeout, inbound, &mut cancel).await
                {
                    Wait::Cancelled => return cancel_transfer(config, &session, outbound).await,
                    Wait::Timeout => transfer.on_reply(None),
                    Wait::Message(msg) => transfer.on_reply(Some(&msg)),
                };
            }

            Step::Finished(outcome) => {
                match &outcome {
                    TransferOutcome::Success { txid } => {
                        info!(session = %session, %txid, "transfer complete")
                    }
                    TransferOutcome::NoAckAfterRetries => {
                        warn!(session = %session, "no acknowledgment after retries");
                        // Let the relay free the session instead of waiting
                        // for its sweep.
                        let abort = Message::Abort {
                            session: session.clone(),
                            reason: "retries exhausted".to_string(),
                        };
                        let _ = send_to_relay(config, outbound, &abort).await;
                    }
                    other => warn!(session = %session, outcome = ?other, "transfer failed"),
                }
                return outcome;
            }
        }
    }
}

/// Notify the relay and unwind after a local cancellation.
async fn cancel_transfer(
    config: &SenderConfig,
    session: &SessionId,
    outbound: &mpsc::Sender<Outbound>,
) -> TransferOutcome {
    info!(session = %session, "transfer cancelled");
    let abort = Message::Abort {
        session: session.clone(),
        reason: "cancelled by sender".to_string(),
    };
    let _ = send_to_relay(config, outbound, &abort).await;
    TransferOutcome::Cancelled
}

async fn send_to_relay(
    config: &SenderConfig,
    outbound: &mpsc::Sender<Outbound>,
    message: &Message,
) -> Result<(), mpsc::error::SendError<Outbound>> {
    outbound
        .send(Outbound::new(config.relay.clone(), message.encode()))
        .await
}

/// Sleep, unless the cancel flag trips first. Returns `false` on cancel.
async fn sleep_unless_cancelled(duration: Duration, cancel: &mut watch::Receiver<bool>) -> bool {
    if *cancel.borrow() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        result = cancel.changed() => match result {
            Ok(()) if *cancel.borrow() => false,
            // Flag owner gone or flag still clear: keep sleeping
            _ => {
                tokio::time::sleep(duration).await;
                true
            }
        },
    }
}

/// Block for the next protocol message within `window`.
///
/// Transport chatter (wrong address, self-loops, non-text kinds) and
/// unparseable lines are dropped without consuming the window; only a real
/// protocol message or the deadline ends the wait.
async fn next_reply(
    config: &SenderConfig,
    window: Duration,
    inbound: &mut mpsc::Receiver<Inbound>,
    cancel: &mut watch::Receiver<bool>,
) -> Wait {
    if *cancel.borrow() {
        return Wait::Cancelled;
    }

    let deadline = Instant::now() + window;
    let mut cancel_open = true;
    loop {
        let received = if cancel_open {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return Wait::Timeout,
                result = cancel.changed() => {
                    match result {
                        Ok(()) if *cancel.borrow() => return Wait::Cancelled,
                        Ok(()) => continue,
                        // Flag owner gone; wait out the window without it
                        Err(_) => {
                            cancel_open = false;
                            continue;
                        }
                    }
                }
                received = inbound.recv() => received,
            }
        } else {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return Wait::Timeout,
                received = inbound.recv() => received,
            }
        };

        let Some(message) = received else {
            // Inbound stream exhausted: same as a silent peer
            return Wait::Timeout;
        };

        if message.kind != MessageKind::Text
            || message.to != config.node_id
            || message.from == config.node_id
        {
            continue;
        }

        match Message::parse(&message.text) {
            Ok(parsed) => return Wait::Message(parsed),
            Err(error) => {
                debug!(from = %message.from, %error, "ignoring unparseable line");
            }
        }
    }
}
