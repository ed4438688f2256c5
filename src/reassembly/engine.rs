//! Session store and chunk accumulation.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use crate::core::constants::REASSEMBLY_TIMEOUT;
use crate::core::{NodeId, SessionId};

/// Key of one transfer attempt under reassembly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    /// Originating node, kept for addressing replies.
    pub sender: NodeId,
    /// The transfer's session id.
    pub session: SessionId,
}

/// One in-progress transfer.
#[derive(Debug)]
struct Session {
    /// Sparse chunk map, ordered by index.
    chunks: BTreeMap<u32, String>,
    /// Total declared by the first chunk; immutable for the session's life.
    total: u32,
    /// Last time a new chunk was stored.
    last_update: Instant,
}

/// Outcome of [`ReassemblyEngine::add_chunk`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// Chunk stored; more are expected.
    Accepted {
        /// Chunks held so far.
        received: u32,
        /// Total expected.
        total: u32,
    },

    /// Final chunk stored; the session is gone and this is the payload,
    /// concatenated in ascending index order.
    Completed(String),

    /// The chunk declared a different total than the session.
    ///
    /// Protocol violation: the session is discarded, and the caller must
    /// surface this to the sender.
    MismatchedTotal {
        /// Total fixed by the first chunk.
        expected: u32,
        /// Total the offending chunk declared.
        got: u32,
    },

    /// This index was already stored. Replays are absorbed silently; the
    /// session is unchanged and its inactivity clock is not refreshed.
    DuplicateIgnored {
        /// The replayed index.
        index: u32,
    },
}

/// Record of one session removed by a stale sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweptSession {
    /// Node to address the timeout notice to.
    pub sender: NodeId,
    /// The abandoned session.
    pub session: SessionId,
    /// How long the session had been idle.
    pub idle: Duration,
}

/// Receiver-side session store.
///
/// Chunk numbering validity (`1 <= index <= total`) is the codec's job;
/// this engine assumes indices it is handed are in range.
#[derive(Debug)]
pub struct ReassemblyEngine {
    sessions: HashMap<SessionKey, Session>,
    timeout: Duration,
}

impl ReassemblyEngine {
    /// Create an engine with the default inactivity timeout.
    pub fn new() -> Self {
        Self::with_timeout(REASSEMBLY_TIMEOUT)
    }

    /// Create an engine with a custom inactivity timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            timeout,
        }
    }

    /// Add one chunk, stamped with the current time.
    pub fn add_chunk(
        &mut self,
        sender: &NodeId,
        session: &SessionId,
        index: u32,
        total: u32,
        payload: &str,
    ) -> AddOutcome {
        self.add_chunk_at(sender, session, index, total, payload, Instant::now())
    }

    /// Add one chunk at a given time.
    pub fn add_chunk_at(
        &mut self,
        sender: &NodeId,
        session: &SessionId,
        index: u32,
        total: u32,
        payload: &str,
        now: Instant,
    ) -> AddOutcome {
        debug_assert!(index >= 1 && index <= total);

        let key = SessionKey {
            sender: sender.clone(),
            session: session.clone(),
        };

        if let Some(existing) = self.sessions.get(&key) {
            if existing.total != total {
                let expected = existing.total;
                self.sessions.remove(&key);
                return AddOutcome::MismatchedTotal {
                    expected,
                    got: total,
                };
            }
        }

        let entry = self.sessions.entry(key.clone()).or_insert_with(|| Session {
            chunks: BTreeMap::new(),
            total,
            last_update: now,
        });

        if entry.chunks.contains_key(&index) {
            return AddOutcome::DuplicateIgnored { index };
        }

        entry.chunks.insert(index, payload.to_string());
        entry.last_update = now;
        let received = entry.chunks.len() as u32;

        if received == total {
            if let Some(finished) = self.sessions.remove(&key) {
                let full: String = finished.chunks.into_values().collect();
                return AddOutcome::Completed(full);
            }
        }

        AddOutcome::Accepted { received, total }
    }

    /// Remove sessions idle past the timeout, stamped with the current time.
    pub fn sweep_stale(&mut self) -> Vec<SweptSession> {
        self.sweep_stale_at(Instant::now())
    }

    /// Remove sessions idle past the timeout at a given time.
    ///
    /// Each removed session is reported exactly once so the caller can turn
    /// it into an outbound notice.
    pub fn sweep_stale_at(&mut self, now: Instant) -> Vec<SweptSession> {
        let timeout = self.timeout;
        let mut swept = Vec::new();

        self.sessions.retain(|key, session| {
            let idle = now.duration_since(session.last_update);
            if idle > timeout {
                swept.push(SweptSession {
                    sender: key.sender.clone(),
                    session: key.session.clone(),
                    idle,
                });
                false
            } else {
                true
            }
        });

        swept
    }

    /// Drop a session outright (peer abort). Returns whether it existed.
    pub fn discard(&mut self, sender: &NodeId, session: &SessionId) -> bool {
        self.sessions
            .remove(&SessionKey {
                sender: sender.clone(),
                session: session.clone(),
            })
            .is_some()
    }

    /// Whether a session is currently under reassembly.
    pub fn contains(&self, sender: &NodeId, session: &SessionId) -> bool {
        self.sessions.contains_key(&SessionKey {
            sender: sender.clone(),
            session: session.clone(),
        })
    }

    /// Number of open sessions.
    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for ReassemblyEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> NodeId {
        NodeId::new("!aabbccdd")
    }

    fn sid() -> SessionId {
        SessionId::new("0123456789ab")
    }

    #[test]
    fn test_single_chunk_completes() {
        let mut engine = ReassemblyEngine::new();

        let outcome = engine.add_chunk(&sender(), &sid(), 1, 1, "deadbeef");

        assert_eq!(outcome, AddOutcome::Completed("deadbeef".to_string()));
        assert_eq!(engine.open_sessions(), 0);
    }

    #[test]
    fn test_out_of_order_reassembly() {
        // 450 hex chars split 170/170/110, delivered 2, 1, 3
        let full = "b".repeat(450);
        let parts = [&full[0..170], &full[170..340], &full[340..450]];
        let mut engine = ReassemblyEngine::new();

        assert_eq!(
            engine.add_chunk(&sender(), &sid(), 2, 3, parts[1]),
            AddOutcome::Accepted {
                received: 1,
                total: 3
            }
        );
        assert_eq!(
            engine.add_chunk(&sender(), &sid(), 1, 3, parts[0]),
            AddOutcome::Accepted {
                received: 2,
                total: 3
            }
        );
        assert_eq!(
            engine.add_chunk(&sender(), &sid(), 3, 3, parts[2]),
            AddOutcome::Completed(full)
        );
    }

    #[test]
    fn test_duplicate_is_ignored() {
        let mut engine = ReassemblyEngine::new();

        engine.add_chunk(&sender(), &sid(), 1, 2, "aa");
        let outcome = engine.add_chunk(&sender(), &sid(), 1, 2, "aa");

        assert_eq!(outcome, AddOutcome::DuplicateIgnored { index: 1 });
        assert_eq!(engine.open_sessions(), 1);

        // Replay did not disturb completion
        assert_eq!(
            engine.add_chunk(&sender(), &sid(), 2, 2, "bb"),
            AddOutcome::Completed("aabb".to_string())
        );
    }

    #[test]
    fn test_mismatched_total_discards_session() {
        let mut engine = ReassemblyEngine::new();

        engine.add_chunk(&sender(), &sid(), 1, 3, "aa");
        let outcome = engine.add_chunk(&sender(), &sid(), 2, 2, "bb");

        assert_eq!(
            outcome,
            AddOutcome::MismatchedTotal {
                expected: 3,
                got: 2
            }
        );
        assert!(!engine.contains(&sender(), &sid()));
    }

    #[test]
    fn test_sessions_keyed_by_sender_and_id() {
        let mut engine = ReassemblyEngine::new();
        let other = NodeId::new("!11223344");

        engine.add_chunk(&sender(), &sid(), 1, 2, "aa");
        engine.add_chunk(&other, &sid(), 1, 2, "cc");

        assert_eq!(engine.open_sessions(), 2);
        assert_eq!(
            engine.add_chunk(&other, &sid(), 2, 2, "dd"),
            AddOutcome::Completed("ccdd".to_string())
        );
        assert!(engine.contains(&sender(), &sid()));
    }

    #[test]
    fn test_sweep_reports_each_session_once() {
        let mut engine = ReassemblyEngine::with_timeout(Duration::from_secs(1));
        let t0 = Instant::now();

        engine.add_chunk_at(&sender(), &sid(), 1, 2, "aa", t0);

        let swept = engine.sweep_stale_at(t0 + Duration::from_millis(1100));
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].sender, sender());
        assert_eq!(swept[0].session, sid());
        assert!(swept[0].idle >= Duration::from_secs(1));

        // Gone: a second sweep reports nothing
        assert!(engine.sweep_stale_at(t0 + Duration::from_secs(2)).is_empty());
        assert!(!engine.contains(&sender(), &sid()));
    }

    #[test]
    fn test_sweep_spares_fresh_sessions() {
        let mut engine = ReassemblyEngine::with_timeout(Duration::from_secs(1));
        let t0 = Instant::now();

        engine.add_chunk_at(&sender(), &sid(), 1, 2, "aa", t0);

        assert!(engine.sweep_stale_at(t0 + Duration::from_millis(900)).is_empty());
        assert!(engine.contains(&sender(), &sid()));
    }

    #[test]
    fn test_duplicate_does_not_refresh_inactivity() {
        let mut engine = ReassemblyEngine::with_timeout(Duration::from_secs(1));
        let t0 = Instant::now();

        engine.add_chunk_at(&sender(), &sid(), 1, 2, "aa", t0);
        engine.add_chunk_at(&sender(), &sid(), 1, 2, "aa", t0 + Duration::from_millis(900));

        // Clock still runs from the first store
        let swept = engine.sweep_stale_at(t0 + Duration::from_millis(1100));
        assert_eq!(swept.len(), 1);
    }

    #[test]
    fn test_discard() {
        let mut engine = ReassemblyEngine::new();

        engine.add_chunk(&sender(), &sid(), 1, 2, "aa");
        assert!(engine.discard(&sender(), &sid()));
        assert!(!engine.discard(&sender(), &sid()));
        assert_eq!(engine.open_sessions(), 0);
    }
}
