//! Presence across an agent's concurrent push streams.

use std::collections::HashMap;

use switchboard_core::identity::Presence;
use switchboard_mcp_runtime::collaborators::{CollaboratorResult, PresenceService};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug)]
struct Holders {
    streams: usize,
    /// Presence the agent had before its first stream; `None` if marking it
    /// online failed.
    restore: Option<Presence>,
}

/// The agent goes online with its first stream and gets its earlier presence
/// back when the last one closes. The lock is held across the presence
/// update so connects and disconnects for one agent apply in order.
#[derive(Debug, Default)]
pub struct StreamPresence {
    agents: Mutex<HashMap<Uuid, Holders>>,
}

impl StreamPresence {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn connect(
        &self,
        presence: &dyn PresenceService,
        agent_id: Uuid,
    ) -> CollaboratorResult<()> {
        let mut agents = self.agents.lock().await;
        let holders = agents.entry(agent_id).or_insert(Holders {
            streams: 0,
            restore: None,
        });
        holders.streams += 1;
        if holders.streams == 1 {
            holders.restore = Some(presence.set(agent_id, Presence::Online).await?);
        }
        Ok(())
    }

    pub async fn disconnect(
        &self,
        presence: &dyn PresenceService,
        agent_id: Uuid,
    ) -> CollaboratorResult<()> {
        let mut agents = self.agents.lock().await;
        let Some(holders) = agents.get_mut(&agent_id) else {
            return Ok(());
        };
        holders.streams = holders.streams.saturating_sub(1);
        if holders.streams > 0 {
            return Ok(());
        }
        if let Some(previous) = agents.remove(&agent_id).and_then(|holders| holders.restore) {
            presence.set(agent_id, previous).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_mcp_runtime::Collaborators;

    #[tokio::test]
    async fn last_stream_restores_presence_from_before_the_first() {
        let collaborators = Collaborators::in_memory();
        let presence = &*collaborators.presence;
        let tracker = StreamPresence::new();
        let agent = Uuid::now_v7();

        tracker.connect(presence, agent).await.unwrap();
        tracker.connect(presence, agent).await.unwrap();

        tracker.disconnect(presence, agent).await.unwrap();
        assert_eq!(presence.get(agent).await.unwrap(), Presence::Online);

        tracker.disconnect(presence, agent).await.unwrap();
        assert_eq!(presence.get(agent).await.unwrap(), Presence::Offline);
    }

    #[tokio::test]
    async fn earlier_non_offline_presence_is_restored() {
        let collaborators = Collaborators::in_memory();
        let presence = &*collaborators.presence;
        let tracker = StreamPresence::new();
        let agent = Uuid::now_v7();
        presence.set(agent, Presence::Away).await.unwrap();

        tracker.connect(presence, agent).await.unwrap();
        tracker.disconnect(presence, agent).await.unwrap();
        assert_eq!(presence.get(agent).await.unwrap(), Presence::Away);
    }

    #[tokio::test]
    async fn disconnect_without_connect_is_ignored() {
        let collaborators = Collaborators::in_memory();
        let tracker = StreamPresence::new();
        let agent = Uuid::now_v7();
        tracker
            .disconnect(&*collaborators.presence, agent)
            .await
            .unwrap();
        assert_eq!(
            collaborators.presence.get(agent).await.unwrap(),
            Presence::Offline
        );
    }
}
