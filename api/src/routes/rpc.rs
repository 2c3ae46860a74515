use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use switchboard_core::error::ApiError;
use switchboard_core::identity::Principal;
use switchboard_mcp_runtime::jsonrpc::{RpcError, error_response, payload_method};
use switchboard_mcp_runtime::{Session, SessionId, SessionTransport};

use crate::auth::AuthenticatedAgent;
use crate::error::AppError;
use crate::routes::{SESSION_ID_HEADER, first_header_token};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/rpc", post(handle_rpc).delete(end_session))
}

/// JSON-RPC over a single request/response exchange
///
/// The optional `Session-Id` header resumes an earlier session. Unknown or
/// stale ids are replaced by a fresh session that is already past the
/// handshake; the resolved id is always echoed in the response header.
#[utoipa::path(
    post,
    path = "/rpc",
    request_body(content = serde_json::Value, description = "JSON-RPC 2.0 request, notification, or batch"),
    params(
        ("Session-Id" = Option<String>, Header, description = "Session to resume")
    ),
    responses(
        (status = 200, description = "JSON-RPC response", body = serde_json::Value),
        (status = 202, description = "Notification accepted, no body"),
        (status = 400, description = "Body is not valid JSON", body = serde_json::Value),
        (status = 401, description = "Missing or invalid API key", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "rpc"
)]
pub async fn handle_rpc(
    State(state): State<AppState>,
    AuthenticatedAgent(principal): AuthenticatedAgent,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::debug!(error = %err, "Rejecting unparseable /rpc body");
            return Ok((
                StatusCode::BAD_REQUEST,
                Json(error_response(Value::Null, RpcError::parse_error("Parse error"))),
            )
                .into_response());
        }
    };

    let session = resolve_session(&state, principal, &headers, &payload).await;
    state.registry.refresh_liveness(&session).await;

    let reply = state.dispatcher.handle_payload(&session, payload).await;
    let mut response = match reply {
        Some(reply) => (StatusCode::OK, Json(reply)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    };

    let header = HeaderValue::from_str(session.id().as_str())
        .map_err(|err| AppError::Internal(format!("session id is not a valid header: {err}")))?;
    response.headers_mut().insert(SESSION_ID_HEADER, header);
    Ok(response)
}

/// Pick the session a request/response call runs against.
///
/// A handshake always starts a fresh session. Otherwise the supplied id is
/// reused when it names a live request/response session of the same agent,
/// and anything else yields a replacement that skips the handshake.
async fn resolve_session(
    state: &AppState,
    principal: Principal,
    headers: &HeaderMap,
    payload: &Value,
) -> Arc<Session> {
    if payload_method(payload) == Some("initialize") {
        let session = state
            .registry
            .open(principal, SessionTransport::RequestResponse);
        state.dispatcher.seed_onboarding(&session).await;
        return session;
    }

    let supplied = first_header_token(headers, SESSION_ID_HEADER);
    if let Some(session) = supplied
        .as_deref()
        .and_then(|id| state.registry.get(&SessionId::from(id)))
        .filter(|session| owned_request_response(session, &principal))
    {
        return session;
    }

    let session = state
        .registry
        .open(principal, SessionTransport::RequestResponse);
    session.mark_initialized();
    state.dispatcher.seed_onboarding(&session).await;
    tracing::info!(
        event = "session_recovered",
        session_id = %session.id(),
        supplied = supplied.as_deref().unwrap_or(""),
        agent_id = %session.principal().agent_id,
        "Synthesized pre-initialized session"
    );
    session
}

fn owned_request_response(session: &Session, principal: &Principal) -> bool {
    session.transport() == SessionTransport::RequestResponse
        && session.principal().agent_id == principal.agent_id
}

/// Close a request/response session
#[utoipa::path(
    delete,
    path = "/rpc",
    params(
        ("Session-Id" = String, Header, description = "Session to close")
    ),
    responses(
        (status = 204, description = "Session closed"),
        (status = 400, description = "Missing Session-Id header", body = ApiError),
        (status = 401, description = "Missing or invalid API key", body = ApiError),
        (status = 404, description = "Unknown session", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "rpc"
)]
pub async fn end_session(
    State(state): State<AppState>,
    AuthenticatedAgent(principal): AuthenticatedAgent,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let Some(raw) = first_header_token(&headers, SESSION_ID_HEADER) else {
        return Err(AppError::validation(
            SESSION_ID_HEADER,
            "Session-Id header is required",
        ));
    };
    let id = SessionId::from(raw);

    let owned = state
        .registry
        .get(&id)
        .is_some_and(|session| owned_request_response(&session, &principal));
    if !owned || !state.registry.release(&id).await {
        return Err(AppError::session_not_found(SESSION_ID_HEADER));
    }
    Ok(StatusCode::NO_CONTENT)
}
