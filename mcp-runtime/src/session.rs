//! Per-connection protocol state.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use switchboard_core::identity::Principal;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

/// Opaque session identifier handed to callers as a resumption token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<&str> for SessionId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which transport adapter created the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionTransport {
    PushStream,
    RequestResponse,
}

/// What to do when the outbound queue is full.
///
/// Only `DropNewest` exists: the message being enqueued is discarded, the
/// producer never blocks and is told through the `enqueue` return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    #[default]
    DropNewest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// Values recorded once by the `initialize` handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandshakeInfo {
    pub protocol_version: String,
    pub client_info: ClientInfo,
}

pub struct Session {
    id: SessionId,
    principal: Principal,
    transport: SessionTransport,
    connected_at: DateTime<Utc>,
    handshake: OnceLock<HandshakeInfo>,
    initialized: AtomicBool,
    onboarded: AtomicBool,
    last_seen: Mutex<Instant>,
    overflow_policy: OverflowPolicy,
    outbound_tx: mpsc::Sender<String>,
    outbound_rx: Mutex<Option<mpsc::Receiver<String>>>,
    closed: CancellationToken,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("agent_id", &self.principal.agent_id)
            .field("transport", &self.transport)
            .field("initialized", &self.is_initialized())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Session {
    pub fn new(
        id: SessionId,
        principal: Principal,
        transport: SessionTransport,
        queue_capacity: usize,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(queue_capacity.max(1));
        let onboarded = principal.onboarded;
        Self {
            id,
            principal,
            transport,
            connected_at: Utc::now(),
            handshake: OnceLock::new(),
            initialized: AtomicBool::new(false),
            onboarded: AtomicBool::new(onboarded),
            last_seen: Mutex::new(Instant::now()),
            overflow_policy: OverflowPolicy::default(),
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            closed: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn transport(&self) -> SessionTransport {
        self.transport
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Record the handshake and flip `initialized`.
    ///
    /// Returns `false` when a handshake was already recorded; the earlier
    /// values are kept.
    pub fn complete_handshake(&self, info: HandshakeInfo) -> bool {
        let recorded = self.handshake.set(info).is_ok();
        self.initialized.store(true, Ordering::Release);
        recorded
    }

    /// Mark the session as past handshake without handshake values. Used for
    /// sessions synthesized after a server-side session loss.
    pub fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::Release);
    }

    pub fn handshake(&self) -> Option<&HandshakeInfo> {
        self.handshake.get()
    }

    pub fn is_onboarded(&self) -> bool {
        self.onboarded.load(Ordering::Acquire)
    }

    pub fn mark_onboarded(&self) {
        self.onboarded.store(true, Ordering::Release);
    }

    pub fn touch(&self) {
        if let Ok(mut last_seen) = self.last_seen.lock() {
            *last_seen = Instant::now();
        }
    }

    pub fn idle_for(&self) -> Duration {
        self.last_seen
            .lock()
            .map(|last_seen| last_seen.elapsed())
            .unwrap_or_default()
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.overflow_policy
    }

    /// Non-blocking push onto the outbound queue.
    ///
    /// Returns `false` if the queue is full or the session is closed; the
    /// message is dropped in both cases and never retried.
    pub fn enqueue(&self, message: String) -> bool {
        if self.is_closed() {
            return false;
        }
        match self.outbound_tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    event = "outbound_message_dropped",
                    session_id = %self.id,
                    policy = ?self.overflow_policy,
                    capacity = self.queue_capacity(),
                    "Outbound queue full, message dropped"
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub fn queued_len(&self) -> usize {
        self.outbound_tx.max_capacity() - self.outbound_tx.capacity()
    }

    pub fn queue_capacity(&self) -> usize {
        self.outbound_tx.max_capacity()
    }

    /// Hand the receiving end of the outbound queue to a push-stream loop.
    /// Only the first caller gets it.
    pub fn take_outbound(&self) -> Option<mpsc::Receiver<String>> {
        self.outbound_rx.lock().ok().and_then(|mut rx| rx.take())
    }

    /// Idempotent; wakes everything awaiting [`Session::closed`].
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::identity::Principal;

    fn session(capacity: usize) -> Session {
        Session::new(
            SessionId::generate(),
            Principal::new(Uuid::now_v7(), "tester"),
            SessionTransport::PushStream,
            capacity,
        )
    }

    fn handshake(version: &str) -> HandshakeInfo {
        HandshakeInfo {
            protocol_version: version.to_string(),
            client_info: ClientInfo {
                name: "agent".to_string(),
                version: "1.0".to_string(),
            },
        }
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(SessionId::generate(), SessionId::generate());
    }

    #[test]
    fn handshake_is_recorded_once_and_initialized_never_reverts() {
        let session = session(4);
        assert!(!session.is_initialized());

        assert!(session.complete_handshake(handshake("2025-06-18")));
        assert!(session.is_initialized());

        assert!(!session.complete_handshake(handshake("2024-11-05")));
        assert!(session.is_initialized());
        assert_eq!(
            session.handshake().map(|h| h.protocol_version.as_str()),
            Some("2025-06-18")
        );
    }

    #[test]
    fn mark_initialized_leaves_handshake_empty() {
        let session = session(4);
        session.mark_initialized();
        assert!(session.is_initialized());
        assert!(session.handshake().is_none());
    }

    #[test]
    fn enqueue_on_full_queue_drops_without_growing() {
        let session = session(2);
        assert!(session.enqueue("a".to_string()));
        assert!(session.enqueue("b".to_string()));
        assert!(!session.enqueue("c".to_string()));
        assert_eq!(session.queued_len(), 2);
        assert_eq!(session.queue_capacity(), 2);
    }

    #[tokio::test]
    async fn outbound_queue_is_fifo() {
        let session = session(8);
        for n in 0..5 {
            assert!(session.enqueue(format!("m{n}")));
        }
        let mut rx = session.take_outbound().expect("receiver available");
        for n in 0..5 {
            assert_eq!(rx.recv().await, Some(format!("m{n}")));
        }
    }

    #[test]
    fn outbound_receiver_can_only_be_taken_once() {
        let session = session(1);
        assert!(session.take_outbound().is_some());
        assert!(session.take_outbound().is_none());
    }

    #[tokio::test]
    async fn close_twice_is_same_as_once() {
        let session = session(1);
        session.close();
        session.close();
        assert!(session.is_closed());
        session.closed().await;
        assert!(!session.enqueue("late".to_string()));
    }

    #[test]
    fn onboarding_flag_is_seeded_from_principal() {
        let principal = Principal::new(Uuid::now_v7(), "veteran").with_onboarded(true);
        let session = Session::new(
            SessionId::generate(),
            principal,
            SessionTransport::RequestResponse,
            1,
        );
        assert!(session.is_onboarded());
    }
}
