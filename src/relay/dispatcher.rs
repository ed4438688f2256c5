//! Inbound message dispatch and reply emission.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::broadcast::{TxBroadcaster, short_reason};
use crate::core::constants::{REASSEMBLY_TIMEOUT, SWEEP_INTERVAL, SWEEP_TICK};
use crate::core::{BroadcastError, Inbound, MessageKind, NodeId, Outbound, RelayError, SessionId};
use crate::reassembly::{AddOutcome, ReassemblyEngine};
use crate::wire::{AckDirective, Message, WireError};

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// This relay's mesh identity.
    pub node_id: NodeId,
    /// Inactivity timeout for sessions under reassembly.
    pub reassembly_timeout: Duration,
    /// Housekeeping tick.
    pub sweep_tick: Duration,
    /// Minimum interval between actual stale sweeps.
    pub sweep_interval: Duration,
}

impl RelayConfig {
    /// Default timings for a relay with the given identity.
    pub fn new(node_id: impl Into<NodeId>) -> Self {
        Self {
            node_id: node_id.into(),
            reassembly_timeout: REASSEMBLY_TIMEOUT,
            sweep_tick: SWEEP_TICK,
            sweep_interval: SWEEP_INTERVAL,
        }
    }
}

/// One relay identity's dispatcher.
///
/// The session store sits behind a single mutex shared by chunk handling
/// and the stale sweep; the lock is never held across an await or any I/O.
/// Outbound replies go out after it is released, and broadcasts run on
/// their own task so a slow backend never stalls ingestion.
pub struct Relay {
    config: RelayConfig,
    engine: Mutex<ReassemblyEngine>,
    outbound: mpsc::Sender<Outbound>,
    broadcaster: Arc<dyn TxBroadcaster>,
}

impl Relay {
    /// Create a dispatcher that replies via `outbound` and submits completed
    /// transactions to `broadcaster`.
    pub fn new(
        config: RelayConfig,
        outbound: mpsc::Sender<Outbound>,
        broadcaster: Arc<dyn TxBroadcaster>,
    ) -> Arc<Self> {
        let engine = Mutex::new(ReassemblyEngine::with_timeout(config.reassembly_timeout));
        Arc::new(Self {
            config,
            engine,
            outbound,
            broadcaster,
        })
    }

    /// Run until the inbound channel closes.
    pub async fn run(self: Arc<Self>, mut inbound: mpsc::Receiver<Inbound>) -> Result<(), RelayError> {
        let mut tick = tokio::time::interval(self.config.sweep_tick);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last_sweep = Instant::now();

        info!(node = %self.config.node_id, "relay dispatcher running");

        loop {
            tokio::select! {
                received = inbound.recv() => match received {
                    Some(message) => self.handle_inbound(message).await?,
                    None => {
                        info!("inbound transport closed, relay stopping");
                        return Ok(());
                    }
                },
                _ = tick.tick() => {
                    if last_sweep.elapsed() >= self.config.sweep_interval {
                        last_sweep = Instant::now();
                        self.sweep_once().await?;
                    }
                }
            }
        }
    }

    /// Number of sessions currently under reassembly.
    pub fn open_sessions(&self) -> usize {
        self.lock_engine().open_sessions()
    }

    /// Process one transport delivery.
    pub async fn handle_inbound(&self, message: Inbound) -> Result<(), RelayError> {
        // Filtered traffic, not protocol errors
        if message.kind != MessageKind::Text
            || message.to != self.config.node_id
            || message.from == self.config.node_id
        {
            return Ok(());
        }

        let parsed = match Message::parse(&message.text) {
            Ok(parsed) => parsed,
            Err(error) => return self.handle_unparseable(&message, &error).await,
        };

        match parsed {
            Message::Chunk {
                session,
                index,
                total,
                payload,
            } => {
                self.handle_chunk(message.from, session, index, total, &payload)
                    .await
            }

            Message::Abort { session, reason } => {
                let existed = self.lock_engine().discard(&message.from, &session);
                if existed {
                    info!(sender = %message.from, %session, %reason, "session aborted by sender");
                }
                Ok(())
            }

            // Replies belong to the sender side of the protocol; a relay
            // receiving one is seeing reflected or misrouted traffic.
            other => {
                debug!(from = %message.from, message = ?other, "ignoring non-chunk message");
                Ok(())
            }
        }
    }

    async fn handle_chunk(
        &self,
        sender: NodeId,
        session: SessionId,
        index: u32,
        total: u32,
        payload: &str,
    ) -> Result<(), RelayError> {
        let outcome = self
            .lock_engine()
            .add_chunk(&sender, &session, index, total, payload);

        match outcome {
            AddOutcome::Accepted { received, .. } => {
                debug!(%sender, %session, index, total, received, "chunk accepted");
                self.send_chunk_ack(&sender, &session, index, total).await
            }

            AddOutcome::Completed(full_hex) => {
                info!(%sender, %session, total, len = full_hex.len(), "transaction reassembled");
                self.send_chunk_ack(&sender, &session, index, total).await?;
                self.spawn_broadcast(sender, session, full_hex);
                Ok(())
            }

            AddOutcome::MismatchedTotal { expected, got } => {
                warn!(%sender, %session, expected, got, "mismatched chunk total, session discarded");
                self.send(
                    &sender,
                    &Message::Nack {
                        session,
                        detail: format!("MismatchedTotalChunks: expected {expected}, got {got}"),
                    },
                )
                .await
            }

            AddOutcome::DuplicateIgnored { index } => {
                debug!(%sender, %session, index, "duplicate chunk ignored");
                Ok(())
            }
        }
    }

    /// Acknowledge one stored chunk.
    ///
    /// The directive depends only on the chunk's own position: the last
    /// expected index reads as "all received" whether the store just
    /// completed or had already seen the rest.
    async fn send_chunk_ack(
        &self,
        sender: &NodeId,
        session: &SessionId,
        index: u32,
        total: u32,
    ) -> Result<(), RelayError> {
        let directive = if index == total {
            AckDirective::AllChunksReceived
        } else {
            AckDirective::RequestChunk(index + 1)
        };
        self.send(
            sender,
            &Message::ChunkAck {
                session: session.clone(),
                index,
                directive,
            },
        )
        .await
    }

    /// Submit a reassembled transaction off the dispatcher loop.
    fn spawn_broadcast(&self, sender: NodeId, session: SessionId, full_hex: String) {
        let outbound = self.outbound.clone();
        let broadcaster = Arc::clone(&self.broadcaster);

        tokio::spawn(async move {
            let result =
                tokio::task::spawn_blocking(move || broadcaster.broadcast(&full_hex)).await;

            let reply = match result {
                Ok(Ok(txid)) => {
                    info!(%sender, %session, %txid, "transaction broadcast");
                    Message::BroadcastAck { session, txid }
                }
                Ok(Err(BroadcastError::Rejected(raw))) => {
                    // Full backend text stays here; the wire gets the
                    // compact mapping.
                    warn!(%sender, %session, error = %raw, "broadcast rejected");
                    Message::Nack {
                        session,
                        detail: short_reason(&raw),
                    }
                }
                Ok(Err(BroadcastError::Unavailable(raw))) => {
                    warn!(%sender, %session, error = %raw, "broadcast backend unavailable");
                    Message::Nack {
                        session,
                        detail: "Broadcast backend unavailable".to_string(),
                    }
                }
                Err(join_error) => {
                    warn!(%sender, %session, %join_error, "broadcast task failed");
                    Message::Nack {
                        session,
                        detail: "Broadcast failed".to_string(),
                    }
                }
            };

            if outbound
                .send(Outbound::new(sender, reply.encode()))
                .await
                .is_err()
            {
                warn!("outbound transport closed, broadcast verdict dropped");
            }
        });
    }

    /// NACK a malformed line when it names a session; drop it otherwise.
    async fn handle_unparseable(
        &self,
        message: &Inbound,
        error: &WireError,
    ) -> Result<(), RelayError> {
        debug!(from = %message.from, %error, "unparseable line");

        let mut fields = message.text.split('|');
        let looks_like_protocol = fields
            .next()
            .is_some_and(|t| t.starts_with("BTC_"));
        let session = fields.next().filter(|s| !s.is_empty());

        if let (true, Some(session)) = (looks_like_protocol, session) {
            let WireError::InvalidFormat { reason, .. } = error;
            return self
                .send(
                    &message.from,
                    &Message::Nack {
                        session: SessionId::new(session),
                        detail: format!("Invalid format: {reason}"),
                    },
                )
                .await;
        }
        Ok(())
    }

    /// Sweep stale sessions and notify their senders.
    pub async fn sweep_once(&self) -> Result<(), RelayError> {
        self.sweep_at(Instant::now()).await
    }

    /// Sweep stale sessions at a given time.
    pub async fn sweep_at(&self, now: Instant) -> Result<(), RelayError> {
        let swept = self.lock_engine().sweep_stale_at(now);

        for stale in swept {
            warn!(
                sender = %stale.sender,
                session = %stale.session,
                idle_secs = stale.idle.as_secs(),
                "reassembly session timed out"
            );
            self.send(
                &stale.sender,
                &Message::Nack {
                    session: stale.session,
                    detail: "Reassembly timeout".to_string(),
                },
            )
            .await?;
        }
        Ok(())
    }

    async fn send(&self, to: &NodeId, message: &Message) -> Result<(), RelayError> {
        self.outbound
            .send(Outbound::new(to.clone(), message.encode()))
            .await
            .map_err(|_| RelayError::OutboundClosed)
    }

    fn lock_engine(&self) -> std::sync::MutexGuard<'_, ReassemblyEngine> {
        // Poisoning means a panic elsewhere while holding the lock; the
        // session map itself is still consistent.
        match self.engine.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Broadcast stub: records submissions, answers from a script.
    struct FakeBackend {
        submissions: Mutex<Vec<String>>,
        result: Result<String, BroadcastError>,
    }

    impl FakeBackend {
        fn ok(txid: &str) -> Arc<Self> {
            Arc::new(Self {
                submissions: Mutex::new(Vec::new()),
                result: Ok(txid.to_string()),
            })
        }

        fn failing(error: BroadcastError) -> Arc<Self> {
            Arc::new(Self {
                submissions: Mutex::new(Vec::new()),
                result: Err(error),
            })
        }

        fn submissions(&self) -> Vec<String> {
            self.submissions.lock().unwrap().clone()
        }
    }

    impl TxBroadcaster for FakeBackend {
        fn broadcast(&self, raw_tx_hex: &str) -> Result<String, BroadcastError> {
            self.submissions.lock().unwrap().push(raw_tx_hex.to_string());
            self.result.clone()
        }
    }

    fn config() -> RelayConfig {
        RelayConfig::new("!relay001")
    }

    fn chunk_line(session: &str, index: u32, total: u32, payload: &str) -> Inbound {
        Inbound::text(
            "!sender01",
            "!relay001",
            Message::Chunk {
                session: SessionId::new(session),
                index,
                total,
                payload: payload.to_string(),
            }
            .encode(),
        )
    }

    async fn recv_line(rx: &mut mpsc::Receiver<Outbound>) -> String {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("reply within deadline")
            .expect("channel open")
            .text
    }

    #[tokio::test]
    async fn test_chunk_stream_acked_and_broadcast() {
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let backend = FakeBackend::ok("deadbeef");
        let relay = Relay::new(config(), out_tx, backend.clone());

        let full = "a".repeat(510);

        relay
            .handle_inbound(chunk_line("0123456789ab", 1, 3, &full[0..170]))
            .await
            .unwrap();
        assert_eq!(
            recv_line(&mut out_rx).await,
            "BTC_CHUNK_ACK|0123456789ab|1|OK|REQUEST_CHUNK|2"
        );

        relay
            .handle_inbound(chunk_line("0123456789ab", 2, 3, &full[170..340]))
            .await
            .unwrap();
        assert_eq!(
            recv_line(&mut out_rx).await,
            "BTC_CHUNK_ACK|0123456789ab|2|OK|REQUEST_CHUNK|3"
        );

        relay
            .handle_inbound(chunk_line("0123456789ab", 3, 3, &full[340..510]))
            .await
            .unwrap();
        assert_eq!(
            recv_line(&mut out_rx).await,
            "BTC_CHUNK_ACK|0123456789ab|3|OK|ALL_CHUNKS_RECEIVED"
        );

        // Broadcast runs on its own task; the verdict arrives next
        assert_eq!(
            recv_line(&mut out_rx).await,
            "BTC_ACK|0123456789ab|SUCCESS|TXID:deadbeef"
        );
        assert_eq!(backend.submissions(), vec![full]);
        assert_eq!(relay.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_rejected_broadcast_nacks_short_reason() {
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let backend = FakeBackend::failing(BroadcastError::Rejected(
            "-26: 66: insufficient fee, rejected by network rules".to_string(),
        ));
        let relay = Relay::new(config(), out_tx, backend);

        relay
            .handle_inbound(chunk_line("0123456789ab", 1, 1, "deadbeef"))
            .await
            .unwrap();

        assert_eq!(
            recv_line(&mut out_rx).await,
            "BTC_CHUNK_ACK|0123456789ab|1|OK|ALL_CHUNKS_RECEIVED"
        );
        assert_eq!(
            recv_line(&mut out_rx).await,
            "BTC_NACK|0123456789ab|ERROR|Insufficient fee"
        );
    }

    #[tokio::test]
    async fn test_unavailable_backend_nacks_fixed_reason() {
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let backend = FakeBackend::failing(BroadcastError::Unavailable(
            "connection refused".to_string(),
        ));
        let relay = Relay::new(config(), out_tx, backend);

        relay
            .handle_inbound(chunk_line("0123456789ab", 1, 1, "deadbeef"))
            .await
            .unwrap();

        recv_line(&mut out_rx).await; // chunk ack
        assert_eq!(
            recv_line(&mut out_rx).await,
            "BTC_NACK|0123456789ab|ERROR|Broadcast backend unavailable"
        );
    }

    #[tokio::test]
    async fn test_mismatched_total_nacked_and_discarded() {
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let relay = Relay::new(config(), out_tx, FakeBackend::ok("x"));

        relay
            .handle_inbound(chunk_line("0123456789ab", 1, 3, "aa"))
            .await
            .unwrap();
        recv_line(&mut out_rx).await;

        relay
            .handle_inbound(chunk_line("0123456789ab", 2, 2, "bb"))
            .await
            .unwrap();
        assert_eq!(
            recv_line(&mut out_rx).await,
            "BTC_NACK|0123456789ab|ERROR|MismatchedTotalChunks: expected 3, got 2"
        );
        assert_eq!(relay.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_chunk_is_silent() {
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let relay = Relay::new(config(), out_tx, FakeBackend::ok("x"));

        relay
            .handle_inbound(chunk_line("0123456789ab", 1, 2, "aa"))
            .await
            .unwrap();
        recv_line(&mut out_rx).await;

        relay
            .handle_inbound(chunk_line("0123456789ab", 1, 2, "aa"))
            .await
            .unwrap();

        // Nothing for the replay; the next real chunk is acked as usual
        relay
            .handle_inbound(chunk_line("0123456789ab", 2, 2, "bb"))
            .await
            .unwrap();
        assert_eq!(
            recv_line(&mut out_rx).await,
            "BTC_CHUNK_ACK|0123456789ab|2|OK|ALL_CHUNKS_RECEIVED"
        );
    }

    #[tokio::test]
    async fn test_filtered_traffic_gets_no_reply() {
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let relay = Relay::new(config(), out_tx, FakeBackend::ok("x"));

        // Addressed elsewhere
        relay
            .handle_inbound(Inbound::text("!sender01", "!other999", "BTC_TX|s|1/1|aa"))
            .await
            .unwrap();
        // Our own echo
        relay
            .handle_inbound(Inbound::text("!relay001", "!relay001", "BTC_TX|s|1/1|aa"))
            .await
            .unwrap();
        // Wrong kind
        let mut telemetry = Inbound::text("!sender01", "!relay001", "BTC_TX|s|1/1|aa");
        telemetry.kind = MessageKind::Telemetry;
        relay.handle_inbound(telemetry).await.unwrap();
        // Plain chat
        relay
            .handle_inbound(Inbound::text("!sender01", "!relay001", "hello there"))
            .await
            .unwrap();

        assert!(out_rx.try_recv().is_err());
        assert_eq!(relay.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_malformed_protocol_line_nacked_with_detail() {
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let relay = Relay::new(config(), out_tx, FakeBackend::ok("x"));

        relay
            .handle_inbound(Inbound::text(
                "!sender01",
                "!relay001",
                "BTC_TX|0123456789ab|nonsense|aa",
            ))
            .await
            .unwrap();

        let line = recv_line(&mut out_rx).await;
        assert!(line.starts_with("BTC_NACK|0123456789ab|ERROR|Invalid format:"));
    }

    #[tokio::test]
    async fn test_sender_abort_discards_session() {
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let relay = Relay::new(config(), out_tx, FakeBackend::ok("x"));

        relay
            .handle_inbound(chunk_line("0123456789ab", 1, 3, "aa"))
            .await
            .unwrap();
        recv_line(&mut out_rx).await;
        assert_eq!(relay.open_sessions(), 1);

        relay
            .handle_inbound(Inbound::text(
                "!sender01",
                "!relay001",
                "BTC_SESSION_ABORT|0123456789ab|cancelled by sender",
            ))
            .await
            .unwrap();

        assert_eq!(relay.open_sessions(), 0);
        assert!(out_rx.try_recv().is_err());
    }

    #[cfg(feature = "sender")]
    #[tokio::test]
    async fn test_full_transfer_through_relay() {
        use crate::sender::{SenderConfig, TransferOutcome, run_transfer};
        use tokio::sync::watch;

        let (to_relay_tx, to_relay_rx) = mpsc::channel(8);
        let (relay_out_tx, mut relay_out_rx) = mpsc::channel(8);
        let (to_sender_tx, mut to_sender_rx) = mpsc::channel(8);
        let (sender_out_tx, mut sender_out_rx) = mpsc::channel::<Outbound>(8);

        let backend = FakeBackend::ok("deadbeef");
        let relay = Relay::new(config(), relay_out_tx, backend.clone());
        let relay_task = tokio::spawn(Arc::clone(&relay).run(to_relay_rx));

        // Sender's transmissions arrive at the relay stamped with the
        // sender's identity; the relay's replies flow back the same way.
        tokio::spawn(async move {
            while let Some(out) = sender_out_rx.recv().await {
                let delivery = Inbound::text(NodeId::new("!sender01"), out.to, out.text);
                if to_relay_tx.send(delivery).await.is_err() {
                    break;
                }
            }
        });
        tokio::spawn(async move {
            while let Some(out) = relay_out_rx.recv().await {
                let delivery = Inbound::text(NodeId::new("!relay001"), out.to, out.text);
                if to_sender_tx.send(delivery).await.is_err() {
                    break;
                }
            }
        });

        let mut sender_config = SenderConfig::new("!sender01", "!relay001");
        sender_config.ack_timeout = Duration::from_millis(500);
        sender_config.verdict_timeout = Duration::from_secs(1);

        // 255 bytes -> 510 hex chars -> three chunks
        let tx_hex = hex::encode([0xab; 255]);
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let outcome = run_transfer(
            &sender_config,
            &tx_hex,
            SessionId::new("0123456789ab"),
            &sender_out_tx,
            &mut to_sender_rx,
            cancel_rx,
        )
        .await;

        assert_eq!(
            outcome,
            TransferOutcome::Success {
                txid: "deadbeef".to_string()
            }
        );
        assert_eq!(backend.submissions(), vec![tx_hex]);
        assert_eq!(relay.open_sessions(), 0);
        relay_task.abort();
    }

    #[tokio::test]
    async fn test_sweep_nacks_stale_sessions() {
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let mut cfg = config();
        cfg.reassembly_timeout = Duration::from_secs(1);
        let relay = Relay::new(cfg, out_tx, FakeBackend::ok("x"));

        relay
            .handle_inbound(chunk_line("0123456789ab", 1, 3, "aa"))
            .await
            .unwrap();
        recv_line(&mut out_rx).await;

        relay
            .sweep_at(Instant::now() + Duration::from_millis(1100))
            .await
            .unwrap();

        assert_eq!(
            recv_line(&mut out_rx).await,
            "BTC_NACK|0123456789ab|ERROR|Reassembly timeout"
        );
        assert_eq!(relay.open_sessions(), 0);

        // Reported once: a second sweep is silent
        relay
            .sweep_at(Instant::now() + Duration::from_secs(2))
            .await
            .unwrap();
        assert!(out_rx.try_recv().is_err());
    }
}
