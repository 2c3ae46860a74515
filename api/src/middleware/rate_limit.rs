use axum::Router;
use axum::body::Body;
use axum::http::{HeaderValue, Response, StatusCode};
use governor::middleware::NoOpMiddleware;
use tower_governor::governor::{GovernorConfig, GovernorConfigBuilder};
use tower_governor::key_extractor::SmartIpKeyExtractor;
use tower_governor::{GovernorError, GovernorLayer};

type RateLimitLayer = GovernorLayer<SmartIpKeyExtractor, NoOpMiddleware, Body>;

/// Rate limit for /rpc: 600 requests/minute per IP, bursts of 60.
pub fn rpc_layer() -> Option<RateLimitLayer> {
    build(
        "rpc",
        GovernorConfigBuilder::default()
            .per_millisecond(100)
            .burst_size(60)
            .key_extractor(SmartIpKeyExtractor)
            .finish(),
    )
}

/// Rate limit for POST /push-stream/submit: same budget as /rpc.
pub fn submit_layer() -> Option<RateLimitLayer> {
    build(
        "push_stream_submit",
        GovernorConfigBuilder::default()
            .per_millisecond(100)
            .burst_size(60)
            .key_extractor(SmartIpKeyExtractor)
            .finish(),
    )
}

/// Attach `layer` to `router` when the limiter could be built.
pub fn limited<S>(router: Router<S>, layer: Option<RateLimitLayer>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    match layer {
        Some(layer) => router.layer(layer),
        None => router,
    }
}

fn build(
    name: &'static str,
    config: Option<GovernorConfig<SmartIpKeyExtractor, NoOpMiddleware>>,
) -> Option<RateLimitLayer> {
    match config {
        Some(config) => Some(GovernorLayer::new(config).error_handler(json_error_handler)),
        None => {
            tracing::error!(layer = name, "Invalid rate limit configuration; limiter disabled");
            None
        }
    }
}

/// Error handler that returns JSON in ApiError format with a Retry-After header.
fn json_error_handler(err: GovernorError) -> Response<Body> {
    let (status, retry_after, message) = match err {
        GovernorError::TooManyRequests { wait_time, .. } => (
            StatusCode::TOO_MANY_REQUESTS,
            Some(wait_time),
            format!("Too many requests. Retry after {wait_time} seconds."),
        ),
        GovernorError::UnableToExtractKey => (
            StatusCode::INTERNAL_SERVER_ERROR,
            None,
            "Unable to determine client identity for rate limiting".to_string(),
        ),
        GovernorError::Other { code, msg, .. } => {
            (code, None, msg.unwrap_or_default().to_string())
        }
    };

    let body = serde_json::json!({
        "error": switchboard_core::error::codes::RATE_LIMITED,
        "message": message,
        "request_id": uuid::Uuid::now_v7().to_string(),
    });

    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert("content-type", HeaderValue::from_static("application/json"));
    if let Some(wait_time) = retry_after {
        response
            .headers_mut()
            .insert("retry-after", HeaderValue::from(wait_time));
    }
    response
}
