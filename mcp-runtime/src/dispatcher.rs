//! Method routing shared by every transport.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::catalog::ToolCatalog;
use crate::collaborators::Collaborators;
use crate::executor::ToolExecutor;
use crate::jsonrpc::{Decoded, Incoming, RpcError, decode, error_response, success_response};
use crate::permission::{Caller, Denial, PermissionFilter};
use crate::session::{ClientInfo, HandshakeInfo, Session};

pub const SERVER_NAME: &str = "switchboard";
/// Newest first; the first entry is answered when a client asks for an
/// unsupported version.
pub const PROTOCOL_VERSIONS: [&str; 3] = ["2025-06-18", "2025-03-26", "2024-11-05"];
pub const LATEST_PROTOCOL_VERSION: &str = PROTOCOL_VERSIONS[0];

const INSTRUCTIONS: &str = "Call tools/list to see the tools available to you; the list depends on your capabilities. If an 'onboard' tool is offered, call it before anything else. Tool failures come back as results with isError=true and a structured error you can act on.";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeParams {
    protocol_version: String,
    client_info: ClientInfo,
}

pub fn negotiate_protocol_version(requested: &str) -> &'static str {
    PROTOCOL_VERSIONS
        .into_iter()
        .find(|version| *version == requested)
        .unwrap_or(LATEST_PROTOCOL_VERSION)
}

#[derive(Debug, Clone)]
pub struct ProtocolDispatcher {
    filter: PermissionFilter,
    executor: ToolExecutor,
}

impl ProtocolDispatcher {
    pub fn new(catalog: Arc<ToolCatalog>, collaborators: Collaborators) -> Self {
        Self {
            filter: PermissionFilter::new(catalog),
            executor: ToolExecutor::new(collaborators),
        }
    }

    pub fn filter(&self) -> &PermissionFilter {
        &self.filter
    }

    pub fn collaborators(&self) -> &Collaborators {
        self.executor.collaborators()
    }

    /// Fold the onboarding service's view into a freshly created session.
    /// A failing lookup leaves the principal's own flag in place.
    pub async fn seed_onboarding(&self, session: &Session) {
        if session.is_onboarded() {
            return;
        }
        match self
            .collaborators()
            .onboarding
            .is_onboarded(session.principal().agent_id)
            .await
        {
            Ok(true) => session.mark_onboarded(),
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(
                    event = "onboarding_lookup_failed",
                    session_id = %session.id(),
                    error = %err,
                    "Could not resolve onboarding state"
                );
            }
        }
    }

    /// Process a decoded JSON payload (single message or batch) against
    /// `session`. `None` means nothing should be sent back.
    pub async fn handle_payload(&self, session: &Session, payload: Value) -> Option<Value> {
        session.touch();
        match payload {
            Value::Array(batch) => {
                if batch.is_empty() {
                    return Some(error_response(
                        Value::Null,
                        RpcError::invalid_request("Batch request must not be empty"),
                    ));
                }
                let mut responses = Vec::new();
                for item in batch {
                    if let Some(response) = self.handle_message(session, item).await {
                        responses.push(response);
                    }
                }
                (!responses.is_empty()).then_some(Value::Array(responses))
            }
            single => self.handle_message(session, single).await,
        }
    }

    pub async fn handle_message(&self, session: &Session, incoming: Value) -> Option<Value> {
        let message = match decode(incoming) {
            Decoded::Message(message) => message,
            Decoded::Rejected(reply) => return Some(reply),
            Decoded::Ignored => return None,
        };
        let Incoming { id, method, params } = message;

        let Some(id) = id else {
            self.handle_notification(session, &method);
            return None;
        };

        Some(match self.handle_request(session, &method, params).await {
            Ok(result) => success_response(id, result),
            Err(err) => error_response(id, err),
        })
    }

    fn handle_notification(&self, session: &Session, method: &str) {
        if matches!(
            method,
            "notifications/initialized" | "notifications/cancelled"
        ) {
            return;
        }
        tracing::debug!(
            event = "notification_ignored",
            session_id = %session.id(),
            method,
            "Ignoring notification"
        );
    }

    async fn handle_request(
        &self,
        session: &Session,
        method: &str,
        params: Value,
    ) -> Result<Value, RpcError> {
        match method {
            "initialize" => self.initialize(session, params),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.tools_list(session)),
            "tools/call" => self.tools_call(session, params).await,
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    fn initialize(&self, session: &Session, params: Value) -> Result<Value, RpcError> {
        let params: InitializeParams = serde_json::from_value(params)
            .map_err(|err| RpcError::invalid_params(format!("Invalid initialize params: {err}")))?;

        let negotiated = negotiate_protocol_version(&params.protocol_version);
        let recorded = session.complete_handshake(HandshakeInfo {
            protocol_version: negotiated.to_string(),
            client_info: params.client_info,
        });
        if recorded {
            tracing::info!(
                event = "session_initialized",
                session_id = %session.id(),
                agent_id = %session.principal().agent_id,
                protocol_version = negotiated,
                "Handshake completed"
            );
        } else {
            tracing::debug!(
                event = "session_reinitialized",
                session_id = %session.id(),
                "Repeated initialize; keeping original handshake"
            );
        }

        let protocol_version = session
            .handshake()
            .map(|info| info.protocol_version.clone())
            .unwrap_or_else(|| negotiated.to_string());

        Ok(json!({
            "protocolVersion": protocol_version,
            "capabilities": {
                "tools": {
                    "listChanged": false
                }
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            },
            "instructions": INSTRUCTIONS
        }))
    }

    fn tools_list(&self, session: &Session) -> Value {
        let tools: Vec<Value> = self
            .filter
            .list_for(Caller::of(session))
            .into_iter()
            .map(|tool| tool.to_value())
            .collect();
        json!({ "tools": tools })
    }

    async fn tools_call(&self, session: &Session, params: Value) -> Result<Value, RpcError> {
        if !session.is_initialized() {
            return Err(RpcError::not_initialized());
        }

        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("tools/call params must be an object"))?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires string field 'name'"))?;

        let args = match params.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "tools/call 'arguments' must be an object",
                ));
            }
        };

        let tool = match self.filter.check(Caller::of(session), name) {
            Ok(tool) => tool,
            Err(Denial::UnknownTool) => {
                return Err(RpcError::not_found(format!("Unknown tool '{name}'"))
                    .with_data(json!({ "tool": name })));
            }
            Err(denial) => {
                tracing::warn!(
                    event = "tool_permission_denied",
                    session_id = %session.id(),
                    agent_id = %session.principal().agent_id,
                    tool = name,
                    reason = ?denial,
                    "Tool call denied"
                );
                return Err(RpcError::permission_denied(name));
            }
        };

        let result = self
            .executor
            .execute(session.principal(), tool, &args)
            .await;

        if tool.init_only && !result.is_error {
            session.mark_onboarded();
        }
        Ok(result.to_value())
    }
}
