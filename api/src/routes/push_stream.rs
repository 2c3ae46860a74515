use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Sse;
use axum::response::sse::Event as SseEvent;
use axum::routing::{get, post};
use axum::Router;
use futures::Stream;
use serde::Deserialize;
use serde_json::Value;
use switchboard_core::error::ApiError;
use switchboard_core::identity::Principal;
use switchboard_mcp_runtime::{Collaborators, Session, SessionId, SessionRegistry, SessionTransport};
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::auth::AuthenticatedAgent;
use crate::error::AppError;
use crate::presence::StreamPresence;
use crate::routes::request_base_url;
use crate::state::AppState;

pub fn stream_router() -> Router<AppState> {
    Router::new().route("/push-stream", get(connect))
}

pub fn submit_router() -> Router<AppState> {
    Router::new().route("/push-stream/submit", post(submit))
}

/// Open a push stream
///
/// The first frame is an `endpoint` event naming the submit URL for this
/// session. JSON-RPC replies follow as `message` events; idle periods are
/// filled with keepalive comments.
#[utoipa::path(
    get,
    path = "/push-stream",
    responses(
        (status = 200, description = "Server-sent event stream", content_type = "text/event-stream", body = String),
        (status = 401, description = "Missing or invalid API key", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "push-stream"
)]
pub async fn connect(
    State(state): State<AppState>,
    AuthenticatedAgent(principal): AuthenticatedAgent,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, AppError> {
    let session = state
        .registry
        .open(principal, SessionTransport::PushStream);
    let Some(outbound) = session.take_outbound() else {
        state.registry.delete_session(&session);
        return Err(AppError::Internal(format!(
            "outbound queue of session {} already taken",
            session.id()
        )));
    };
    state.dispatcher.seed_onboarding(&session).await;
    state.registry.refresh_liveness(&session).await;

    let collaborators = state.dispatcher.collaborators().clone();
    let agent_id = session.principal().agent_id;
    if let Err(err) = state
        .stream_presence
        .connect(&*collaborators.presence, agent_id)
        .await
    {
        tracing::warn!(
            event = "presence_update_failed",
            session_id = %session.id(),
            error = %err,
            "Could not mark agent online"
        );
    }

    let base = state
        .config
        .public_url
        .clone()
        .unwrap_or_else(|| request_base_url(&headers, state.config.port));
    let endpoint = SseEvent::default()
        .event("endpoint")
        .data(format!("{base}/push-stream/submit?session={}", session.id()));

    tracing::info!(
        event = "push_stream_opened",
        session_id = %session.id(),
        agent_id = %agent_id,
        "Push stream connected"
    );

    let period = state.config.keepalive;
    let mut keepalive = tokio::time::interval_at(Instant::now() + period, period);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let push = PushLoop {
        endpoint: Some(endpoint),
        outbound,
        keepalive,
        shutdown: state.shutdown.clone(),
        guard: PushStreamGuard {
            registry: state.registry.clone(),
            collaborators,
            stream_presence: state.stream_presence.clone(),
            session,
        },
    };

    Ok(Sse::new(futures::stream::unfold(push, PushLoop::next_frame)))
}

/// Loop state owned by the response body. Dropping it (client hangup,
/// shutdown, or session close) tears the session down through the guard.
struct PushLoop {
    endpoint: Option<SseEvent>,
    outbound: mpsc::Receiver<String>,
    keepalive: Interval,
    shutdown: CancellationToken,
    guard: PushStreamGuard,
}

enum Step {
    Deliver(Option<String>),
    Keepalive,
    Stop,
}

impl PushLoop {
    async fn next_frame(mut self) -> Option<(Result<SseEvent, Infallible>, Self)> {
        if let Some(endpoint) = self.endpoint.take() {
            return Some((Ok(endpoint), self));
        }

        let session = self.guard.session.clone();
        let step = tokio::select! {
            message = self.outbound.recv() => Step::Deliver(message),
            _ = self.keepalive.tick() => Step::Keepalive,
            _ = self.shutdown.cancelled() => Step::Stop,
            _ = session.closed() => Step::Stop,
        };

        match step {
            Step::Deliver(Some(message)) => {
                Some((Ok(SseEvent::default().event("message").data(message)), self))
            }
            Step::Keepalive => {
                self.guard.registry.refresh_liveness(&session).await;
                Some((Ok(SseEvent::default().comment("keepalive")), self))
            }
            Step::Deliver(None) | Step::Stop => None,
        }
    }
}

struct PushStreamGuard {
    registry: Arc<SessionRegistry>,
    collaborators: Collaborators,
    stream_presence: Arc<StreamPresence>,
    session: Arc<Session>,
}

impl Drop for PushStreamGuard {
    fn drop(&mut self) {
        self.registry.delete_session(&self.session);
        tracing::info!(
            event = "push_stream_closed",
            session_id = %self.session.id(),
            connected_at = %self.session.connected_at(),
            "Push stream disconnected"
        );

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let registry = self.registry.clone();
        let collaborators = self.collaborators.clone();
        let stream_presence = self.stream_presence.clone();
        let id = self.session.id().clone();
        let agent_id = self.session.principal().agent_id;
        handle.spawn(async move {
            registry.clear_liveness(&id).await;
            if let Err(err) = stream_presence
                .disconnect(&*collaborators.presence, agent_id)
                .await
            {
                tracing::warn!(
                    event = "presence_update_failed",
                    session_id = %id,
                    error = %err,
                    "Could not restore agent presence"
                );
            }
        });
    }
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SubmitQuery {
    /// Session id from the stream's `endpoint` frame
    pub session: Option<String>,
}

/// Submit a JSON-RPC payload to a push-stream session
///
/// The reply, if any, is delivered on the session's stream rather than in
/// this response.
#[utoipa::path(
    post,
    path = "/push-stream/submit",
    params(SubmitQuery),
    request_body(content = serde_json::Value, description = "JSON-RPC 2.0 request, notification, or batch"),
    responses(
        (status = 202, description = "Accepted; reply follows on the stream"),
        (status = 400, description = "Missing session or invalid JSON", body = ApiError),
        (status = 401, description = "Missing or invalid API key", body = ApiError),
        (status = 404, description = "Unknown session", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "push-stream"
)]
pub async fn submit(
    State(state): State<AppState>,
    AuthenticatedAgent(principal): AuthenticatedAgent,
    Query(query): Query<SubmitQuery>,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let Some(raw) = query.session.filter(|raw| !raw.trim().is_empty()) else {
        return Err(AppError::validation(
            "session",
            "The 'session' query parameter is required",
        ));
    };
    let Some(session) = state
        .registry
        .get(&SessionId::from(raw.trim()))
        .filter(|session| owned_push_stream(session, &principal))
    else {
        return Err(AppError::session_not_found("session"));
    };

    let payload: Value = serde_json::from_slice(&body).map_err(|err| AppError::Validation {
        message: format!("Body is not valid JSON: {err}"),
        field: Some("body".to_string()),
        received: None,
        docs_hint: Some("Send a JSON-RPC 2.0 object or a batch array.".to_string()),
    })?;

    state.registry.refresh_liveness(&session).await;
    if let Some(reply) = state.dispatcher.handle_payload(&session, payload).await
        && !session.enqueue(reply.to_string())
    {
        tracing::warn!(
            event = "push_reply_undelivered",
            session_id = %session.id(),
            closed = session.is_closed(),
            "Reply could not be queued for delivery"
        );
    }
    Ok(StatusCode::ACCEPTED)
}

fn owned_push_stream(session: &Session, principal: &Principal) -> bool {
    session.transport() == SessionTransport::PushStream
        && session.principal().agent_id == principal.agent_id
}
