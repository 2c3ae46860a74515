use std::sync::Arc;

use switchboard_mcp_runtime::{ProtocolDispatcher, SessionRegistry};
use tokio_util::sync::CancellationToken;

use crate::auth::AuthProvider;
use crate::config::ServerConfig;
use crate::presence::StreamPresence;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub dispatcher: Arc<ProtocolDispatcher>,
    pub auth: Arc<dyn AuthProvider>,
    pub config: Arc<ServerConfig>,
    pub stream_presence: Arc<StreamPresence>,
    /// Cancelled once on process shutdown; push streams end when it fires.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        registry: Arc<SessionRegistry>,
        dispatcher: Arc<ProtocolDispatcher>,
        auth: Arc<dyn AuthProvider>,
        config: ServerConfig,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            auth,
            config: Arc::new(config),
            stream_presence: Arc::new(StreamPresence::new()),
            shutdown: CancellationToken::new(),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use switchboard_core::auth::generate_api_key;
    use switchboard_core::identity::{Capability, Principal};
    use switchboard_mcp_runtime::{
        Collaborators, InMemoryLivenessStore, ProtocolDispatcher, SessionRegistry, ToolCatalog,
    };
    use uuid::Uuid;

    use super::AppState;
    use crate::auth::{CredentialEntry, StaticKeyAuthProvider};
    use crate::config::ServerConfig;

    pub struct TestAgent {
        pub key: String,
        pub principal: Principal,
    }

    /// One onboarded agent without capabilities, one onboarded agent with
    /// every capability, and one fresh agent that has not onboarded yet.
    pub struct Fixture {
        pub state: AppState,
        pub worker: TestAgent,
        pub admin: TestAgent,
        pub newcomer: TestAgent,
        pub liveness: Arc<InMemoryLivenessStore>,
    }

    fn agent(name: &str, capabilities: &[Capability], onboarded: bool) -> (TestAgent, CredentialEntry) {
        let (key, key_hash) = generate_api_key();
        let agent_id = Uuid::now_v7();
        let mut principal = Principal::new(agent_id, name).with_onboarded(onboarded);
        for capability in capabilities {
            principal = principal.with_capability(*capability);
        }
        let entry = CredentialEntry {
            key_hash,
            agent_id,
            name: name.to_string(),
            capabilities: capabilities.iter().map(|c| c.as_str().to_string()).collect(),
            onboarded,
        };
        (TestAgent { key, principal }, entry)
    }

    pub fn fixture() -> Fixture {
        fixture_with(ServerConfig::default())
    }

    pub fn fixture_with(config: ServerConfig) -> Fixture {
        let (worker, worker_entry) = agent("worker", &[], true);
        let (admin, admin_entry) = agent("admin", &Capability::ALL, true);
        let (newcomer, newcomer_entry) = agent("newcomer", &[], false);
        let auth = StaticKeyAuthProvider::from_entries(vec![
            worker_entry,
            admin_entry,
            newcomer_entry,
        ])
        .unwrap();

        let liveness = Arc::new(InMemoryLivenessStore::new());
        let registry = Arc::new(SessionRegistry::new(
            liveness.clone(),
            config.registry_config(),
        ));
        let dispatcher = Arc::new(ProtocolDispatcher::new(
            Arc::new(ToolCatalog::standard()),
            Collaborators::in_memory(),
        ));

        Fixture {
            state: AppState::new(registry, dispatcher, Arc::new(auth), config),
            worker,
            admin,
            newcomer,
            liveness,
        }
    }
}
