//! Stop-and-wait transfer state machine.
//!
//! Pure state: the driver performs the sends, the timed receives, and the
//! backoff sleeps; this machine decides what happens after each reply (or
//! lack of one). Exactly one chunk is ever in flight.

use crate::core::SessionId;
use crate::wire::{AckDirective, Message};

/// Phase of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Negotiating the chunk with this 1-based index.
    Sending(u32),
    /// Every chunk acknowledged; waiting on the broadcast verdict.
    AwaitingBroadcastResult,
    /// Finished successfully.
    Done,
    /// Finished without success.
    Aborted,
}

/// Terminal result of a transfer. Each failure mode is distinct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The relay broadcast the transaction.
    Success {
        /// Transaction id reported back by the relay.
        txid: String,
    },
    /// The relay's backend rejected the transaction.
    Rejected {
        /// Short reason from the relay's NACK.
        reason: String,
    },
    /// The peer tore the session down.
    PeerAborted {
        /// Reason from the abort message.
        reason: String,
    },
    /// A chunk went unacknowledged through the whole retry budget.
    NoAckAfterRetries,
    /// Every chunk was acknowledged but no broadcast verdict ever arrived.
    NoFinalConfirmation,
    /// The local caller cancelled the transfer.
    Cancelled,
}

/// What the driver must do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// (Re)send the chunk with this index; back off first if asked.
    Send {
        /// 1-based chunk index.
        index: u32,
        /// Pause before sending (set after an explicit NACK).
        backoff: bool,
    },
    /// Keep waiting for the broadcast verdict.
    AwaitVerdict,
    /// The transfer has ended.
    Finished(TransferOutcome),
}

/// One transfer's ARQ state.
#[derive(Debug)]
pub struct Transfer {
    session: SessionId,
    total: u32,
    max_attempts: u32,
    max_verdict_waits: u32,
    /// Failed attempts for the chunk under negotiation.
    attempts: u32,
    /// Verdict waits that timed out.
    verdict_waits: u32,
    phase: Phase,
}

impl Transfer {
    /// Create a transfer over `total` chunks.
    pub fn new(session: SessionId, total: u32, max_attempts: u32, max_verdict_waits: u32) -> Self {
        debug_assert!(total >= 1);
        Self {
            session,
            total,
            max_attempts: max_attempts.max(1),
            max_verdict_waits: max_verdict_waits.max(1),
            attempts: 0,
            verdict_waits: 0,
            phase: Phase::Sending(1),
        }
    }

    /// The first step: send chunk 1.
    pub fn start(&self) -> Step {
        Step::Send {
            index: 1,
            backoff: false,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Session under transfer.
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Feed the reply to the last send or wait; `None` means the wait timed
    /// out (or the inbound stream was exhausted).
    pub fn on_reply(&mut self, reply: Option<&Message>) -> Step {
        match self.phase {
            Phase::Sending(index) => self.on_chunk_reply(index, reply),
            Phase::AwaitingBroadcastResult => self.on_verdict_reply(reply),
            Phase::Done | Phase::Aborted => Step::Finished(TransferOutcome::NoFinalConfirmation),
        }
    }

    fn on_chunk_reply(&mut self, index: u32, reply: Option<&Message>) -> Step {
        match reply {
            Some(Message::ChunkAck {
                session,
                index: acked,
                directive,
            }) if *session == self.session && *acked == index => match directive {
                AckDirective::RequestChunk(next) if *next == index + 1 && *next <= self.total => {
                    self.attempts = 0;
                    self.phase = Phase::Sending(*next);
                    Step::Send {
                        index: *next,
                        backoff: false,
                    }
                }
                AckDirective::AllChunksReceived if index == self.total => {
                    self.attempts = 0;
                    self.phase = Phase::AwaitingBroadcastResult;
                    Step::AwaitVerdict
                }
                // Directive inconsistent with our position
                _ => self.failed_attempt(index, false),
            },

            Some(Message::Nack { session, .. }) if *session == self.session => {
                self.failed_attempt(index, true)
            }

            Some(Message::Abort { session, reason }) if *session == self.session => {
                self.phase = Phase::Aborted;
                Step::Finished(TransferOutcome::PeerAborted {
                    reason: reason.clone(),
                })
            }

            // Timeout, replies for other sessions, and anything else the
            // mesh delivered: one failed attempt, no backoff.
            _ => self.failed_attempt(index, false),
        }
    }

    fn on_verdict_reply(&mut self, reply: Option<&Message>) -> Step {
        match reply {
            Some(Message::BroadcastAck { session, txid }) if *session == self.session => {
                self.phase = Phase::Done;
                Step::Finished(TransferOutcome::Success { txid: txid.clone() })
            }

            Some(Message::Nack { session, detail }) if *session == self.session => {
                self.phase = Phase::Aborted;
                Step::Finished(TransferOutcome::Rejected {
                    reason: detail.clone(),
                })
            }

            Some(Message::Abort { session, reason }) if *session == self.session => {
                self.phase = Phase::Aborted;
                Step::Finished(TransferOutcome::PeerAborted {
                    reason: reason.clone(),
                })
            }

            // Only a timed-out wait consumes the verdict budget; unrelated
            // traffic keeps the wait open.
            None => {
                self.verdict_waits += 1;
                if self.verdict_waits >= self.max_verdict_waits {
                    self.phase = Phase::Aborted;
                    Step::Finished(TransferOutcome::NoFinalConfirmation)
                } else {
                    Step::AwaitVerdict
                }
            }

            Some(_) => Step::AwaitVerdict,
        }
    }

    fn failed_attempt(&mut self, index: u32, backoff: bool) -> Step {
        self.attempts += 1;
        if self.attempts >= self.max_attempts {
            self.phase = Phase::Aborted;
            Step::Finished(TransferOutcome::NoAckAfterRetries)
        } else {
            Step::Send { index, backoff }
        }
    }
}
