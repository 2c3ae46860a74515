//! Advisory, TTL-based liveness markers shared with other instances.
//!
//! The store is never authoritative on its own: a failing store must not stop
//! an otherwise valid session from being used locally.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum LivenessError {
    #[error("liveness store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait LivenessStore: Send + Sync {
    /// Write or refresh the marker for a session.
    async fn mark_alive(
        &self,
        session_id: &str,
        agent_id: Uuid,
        ttl: Duration,
    ) -> Result<(), LivenessError>;

    async fn is_alive(&self, session_id: &str) -> Result<bool, LivenessError>;

    async fn clear(&self, session_id: &str) -> Result<(), LivenessError>;
}

/// Process-local TTL map keyed by session id. Expired markers are dropped
/// lazily on access; the owning agent only matters to shared stores.
#[derive(Debug, Default)]
pub struct InMemoryLivenessStore {
    markers: Mutex<HashMap<String, Instant>>,
}

impl InMemoryLivenessStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Instant>>, LivenessError> {
        self.markers
            .lock()
            .map_err(|_| LivenessError::Unavailable("marker map poisoned".to_string()))
    }
}

#[async_trait]
impl LivenessStore for InMemoryLivenessStore {
    async fn mark_alive(
        &self,
        session_id: &str,
        _agent_id: Uuid,
        ttl: Duration,
    ) -> Result<(), LivenessError> {
        self.lock()?
            .insert(session_id.to_string(), Instant::now() + ttl);
        Ok(())
    }

    async fn is_alive(&self, session_id: &str) -> Result<bool, LivenessError> {
        let mut markers = self.lock()?;
        let now = Instant::now();
        match markers.get(session_id) {
            Some(expires_at) if *expires_at > now => Ok(true),
            Some(_) => {
                markers.remove(session_id);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn clear(&self, session_id: &str) -> Result<(), LivenessError> {
        self.lock()?.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn marker_lives_until_ttl() {
        let store = InMemoryLivenessStore::new();
        let agent = Uuid::now_v7();
        store
            .mark_alive("s1", agent, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(store.is_alive("s1").await.unwrap());
        assert!(!store.is_alive("s2").await.unwrap());
    }

    #[tokio::test]
    async fn expired_marker_reports_dead() {
        let store = InMemoryLivenessStore::new();
        store
            .mark_alive("s1", Uuid::now_v7(), Duration::ZERO)
            .await
            .unwrap();
        assert!(!store.is_alive("s1").await.unwrap());
    }

    #[tokio::test]
    async fn clear_removes_marker() {
        let store = InMemoryLivenessStore::new();
        store
            .mark_alive("s1", Uuid::now_v7(), Duration::from_secs(60))
            .await
            .unwrap();
        store.clear("s1").await.unwrap();
        assert!(!store.is_alive("s1").await.unwrap());
    }
}
