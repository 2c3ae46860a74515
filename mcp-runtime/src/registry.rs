//! Directory of live sessions shared by both transport adapters.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use switchboard_core::identity::Principal;

use crate::liveness::LivenessStore;
use crate::session::{DEFAULT_OUTBOUND_CAPACITY, Session, SessionId, SessionTransport};

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    /// Liveness marker TTL, also the local idle timeout for reaping.
    pub session_ttl: Duration,
    pub outbound_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            session_ttl: DEFAULT_SESSION_TTL,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

/// All mutations take the write lock; lookups share the read lock.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    liveness: Arc<dyn LivenessStore>,
    config: RegistryConfig,
}

impl SessionRegistry {
    pub fn new(liveness: Arc<dyn LivenessStore>, config: RegistryConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            liveness,
            config,
        }
    }

    pub fn config(&self) -> RegistryConfig {
        self.config
    }

    /// Register a session under `id`.
    ///
    /// An existing entry for the same id is replaced and closed; anything
    /// still queued for it is abandoned.
    pub fn create(
        &self,
        id: SessionId,
        principal: Principal,
        transport: SessionTransport,
    ) -> Arc<Session> {
        let session = Arc::new(Session::new(
            id.clone(),
            principal,
            transport,
            self.config.outbound_capacity,
        ));
        let previous = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, session.clone());

        if let Some(previous) = previous {
            tracing::warn!(
                event = "session_replaced",
                session_id = %previous.id(),
                abandoned_messages = previous.queued_len(),
                "Session entry replaced; queued messages abandoned"
            );
            previous.close();
        }

        tracing::info!(
            event = "session_opened",
            session_id = %session.id(),
            agent_id = %session.principal().agent_id,
            transport = ?session.transport(),
            "Session opened"
        );
        session
    }

    /// Register a session under a freshly generated id.
    pub fn open(&self, principal: Principal, transport: SessionTransport) -> Arc<Session> {
        self.create(SessionId::generate(), principal, transport)
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .filter(|session| !session.is_closed())
            .cloned()
    }

    /// Remove and close the session registered under `id`.
    pub fn delete(&self, id: &SessionId) -> Option<Arc<Session>> {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        if let Some(session) = &removed {
            session.close();
            tracing::info!(
                event = "session_closed",
                session_id = %id,
                agent_id = %session.principal().agent_id,
                "Session closed"
            );
        }
        removed
    }

    /// Remove `session` only if it is still the registered entry for its id,
    /// so a stale owner cannot evict a replacement. The session is closed either way.
    pub fn delete_session(&self, session: &Arc<Session>) -> bool {
        let removed = {
            let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
            match sessions.get(session.id()) {
                Some(current) if Arc::ptr_eq(current, session) => {
                    sessions.remove(session.id());
                    true
                }
                _ => false,
            }
        };
        session.close();
        if removed {
            tracing::info!(
                event = "session_closed",
                session_id = %session.id(),
                agent_id = %session.principal().agent_id,
                "Session closed"
            );
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write or refresh the session's liveness marker. Failures are logged
    /// and otherwise ignored.
    pub async fn refresh_liveness(&self, session: &Session) {
        session.touch();
        if let Err(err) = self
            .liveness
            .mark_alive(
                session.id().as_str(),
                session.principal().agent_id,
                self.config.session_ttl,
            )
            .await
        {
            tracing::warn!(
                event = "liveness_mark_failed",
                session_id = %session.id(),
                error = %err,
                "Failed to write session liveness marker"
            );
        }
    }

    pub async fn clear_liveness(&self, id: &SessionId) {
        if let Err(err) = self.liveness.clear(id.as_str()).await {
            tracing::warn!(
                event = "liveness_clear_failed",
                session_id = %id,
                error = %err,
                "Failed to remove session liveness marker"
            );
        }
    }

    /// Delete the session and its liveness marker.
    pub async fn release(&self, id: &SessionId) -> bool {
        let removed = self.delete(id).is_some();
        self.clear_liveness(id).await;
        removed
    }

    /// Evict request/response sessions that have been idle past the TTL and
    /// whose liveness marker has lapsed. Push-stream sessions are owned by
    /// their transport and never reaped here.
    pub async fn reap_idle(&self) -> usize {
        let candidates: Vec<Arc<Session>> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|session| session.transport() == SessionTransport::RequestResponse)
            .filter(|session| session.idle_for() >= self.config.session_ttl)
            .cloned()
            .collect();

        let mut reaped = 0;
        for session in candidates {
            match self.liveness.is_alive(session.id().as_str()).await {
                Ok(false) => {
                    if self.delete_session(&session) {
                        self.clear_liveness(session.id()).await;
                        tracing::info!(
                            event = "session_reaped",
                            session_id = %session.id(),
                            idle_secs = session.idle_for().as_secs(),
                            "Idle session reaped"
                        );
                        reaped += 1;
                    }
                }
                Ok(true) => {}
                Err(err) => {
                    tracing::debug!(
                        event = "session_reap_skipped",
                        session_id = %session.id(),
                        error = %err,
                        "Liveness store unavailable; keeping session"
                    );
                }
            }
        }
        reaped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::liveness::{InMemoryLivenessStore, LivenessError};
    use async_trait::async_trait;
    use uuid::Uuid;

    struct FailingStore;

    #[async_trait]
    impl LivenessStore for FailingStore {
        async fn mark_alive(&self, _: &str, _: Uuid, _: Duration) -> Result<(), LivenessError> {
            Err(LivenessError::Unavailable("down".to_string()))
        }

        async fn is_alive(&self, _: &str) -> Result<bool, LivenessError> {
            Err(LivenessError::Unavailable("down".to_string()))
        }

        async fn clear(&self, _: &str) -> Result<(), LivenessError> {
            Err(LivenessError::Unavailable("down".to_string()))
        }
    }

    fn principal() -> Principal {
        Principal::new(Uuid::now_v7(), "tester")
    }

    fn registry_with(store: Arc<dyn LivenessStore>, ttl: Duration) -> SessionRegistry {
        SessionRegistry::new(
            store,
            RegistryConfig {
                session_ttl: ttl,
                outbound_capacity: 4,
            },
        )
    }

    #[test]
    fn create_get_delete() {
        let registry = registry_with(Arc::new(InMemoryLivenessStore::new()), DEFAULT_SESSION_TTL);
        let session = registry.open(principal(), SessionTransport::RequestResponse);
        let id = session.id().clone();

        assert!(registry.get(&id).is_some());
        assert_eq!(registry.len(), 1);

        assert!(registry.delete(&id).is_some());
        assert!(registry.get(&id).is_none());
        assert!(session.is_closed());
        assert!(registry.delete(&id).is_none());
    }

    #[test]
    fn replacing_an_entry_closes_the_previous_session() {
        let registry = registry_with(Arc::new(InMemoryLivenessStore::new()), DEFAULT_SESSION_TTL);
        let id = SessionId::from("fixed");
        let first = registry.create(id.clone(), principal(), SessionTransport::PushStream);
        assert!(first.enqueue("pending".to_string()));

        let second = registry.create(id.clone(), principal(), SessionTransport::PushStream);
        assert!(first.is_closed());
        assert!(!second.is_closed());
        assert_eq!(registry.len(), 1);

        let current = registry.get(&id).expect("replacement registered");
        assert!(Arc::ptr_eq(&current, &second));
    }

    #[test]
    fn stale_owner_cannot_evict_replacement() {
        let registry = registry_with(Arc::new(InMemoryLivenessStore::new()), DEFAULT_SESSION_TTL);
        let id = SessionId::from("shared");
        let stale = registry.create(id.clone(), principal(), SessionTransport::PushStream);
        let fresh = registry.create(id.clone(), principal(), SessionTransport::PushStream);

        assert!(!registry.delete_session(&stale));
        assert!(registry.get(&id).is_some());
        assert!(registry.delete_session(&fresh));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn concurrent_creates_are_all_registered() {
        let registry = Arc::new(registry_with(
            Arc::new(InMemoryLivenessStore::new()),
            DEFAULT_SESSION_TTL,
        ));
        let mut handles = Vec::new();
        for _ in 0..32 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry
                    .open(principal(), SessionTransport::RequestResponse)
                    .id()
                    .clone()
            }));
        }
        for handle in handles {
            let id = handle.await.unwrap();
            assert!(registry.get(&id).is_some());
        }
        assert_eq!(registry.len(), 32);
    }

    #[tokio::test]
    async fn release_clears_liveness_marker() {
        let store = Arc::new(InMemoryLivenessStore::new());
        let registry = registry_with(store.clone(), DEFAULT_SESSION_TTL);
        let session = registry.open(principal(), SessionTransport::RequestResponse);
        registry.refresh_liveness(&session).await;
        assert!(store.is_alive(session.id().as_str()).await.unwrap());

        assert!(registry.release(session.id()).await);
        assert!(!store.is_alive(session.id().as_str()).await.unwrap());
    }

    #[tokio::test]
    async fn reap_evicts_idle_sessions_with_lapsed_markers() {
        let store = Arc::new(InMemoryLivenessStore::new());
        let registry = registry_with(store, Duration::ZERO);
        let rpc = registry.open(principal(), SessionTransport::RequestResponse);
        let push = registry.open(principal(), SessionTransport::PushStream);

        assert_eq!(registry.reap_idle().await, 1);
        assert!(registry.get(rpc.id()).is_none());
        assert!(registry.get(push.id()).is_some());
    }

    #[tokio::test]
    async fn reap_keeps_sessions_while_marker_is_alive() {
        let store = Arc::new(InMemoryLivenessStore::new());
        let registry = registry_with(store.clone(), Duration::ZERO);
        let session = registry.open(principal(), SessionTransport::RequestResponse);
        store
            .mark_alive(session.id().as_str(), Uuid::now_v7(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(registry.reap_idle().await, 0);
        assert!(registry.get(session.id()).is_some());
    }

    #[tokio::test]
    async fn failing_store_never_blocks_local_use() {
        let registry = registry_with(Arc::new(FailingStore), Duration::ZERO);
        let session = registry.open(principal(), SessionTransport::RequestResponse);
        registry.refresh_liveness(&session).await;

        assert!(registry.get(session.id()).is_some());
        assert_eq!(registry.reap_idle().await, 0);
        assert!(registry.release(session.id()).await);
    }
}
