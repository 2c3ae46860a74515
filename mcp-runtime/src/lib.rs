//! Transport-independent JSON-RPC tool-calling engine.
//!
//! Transports own a [`SessionRegistry`] and a [`ProtocolDispatcher`] and feed
//! decoded payloads through [`ProtocolDispatcher::handle_payload`].

pub mod args;
pub mod catalog;
pub mod collaborators;
pub mod dispatcher;
pub mod executor;
pub mod in_memory;
pub mod jsonrpc;
pub mod liveness;
pub mod permission;
pub mod registry;
pub mod session;

pub use catalog::{ToolCatalog, ToolDefinition};
pub use collaborators::Collaborators;
pub use dispatcher::{LATEST_PROTOCOL_VERSION, PROTOCOL_VERSIONS, ProtocolDispatcher, SERVER_NAME};
pub use executor::{ToolExecutor, ToolResult};
pub use in_memory::InMemoryWorkspace;
pub use liveness::{InMemoryLivenessStore, LivenessError, LivenessStore};
pub use permission::{Caller, PermissionFilter};
pub use registry::{RegistryConfig, SessionRegistry};
pub use session::{Session, SessionId, SessionTransport};
