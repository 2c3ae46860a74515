use axum::extract::Request;
use axum::http::HeaderValue;
use axum::http::header::{
    CACHE_CONTROL, CONTENT_SECURITY_POLICY, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS,
    X_FRAME_OPTIONS,
};
use axum::middleware::Next;
use axum::response::Response;

/// Security-header baseline for every response.
///
/// JSON-RPC replies carry per-agent data, so responses default to `no-store`
/// unless the handler already chose a cache policy (the push stream does).
pub async fn apply(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(REFERRER_POLICY, HeaderValue::from_static("no-referrer"));
    headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("frame-ancestors 'none'"),
    );
    if !headers.contains_key(CACHE_CONTROL) {
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    }
    response
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::header::CACHE_CONTROL;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use axum::{Router, middleware};
    use tower::ServiceExt;

    async fn ok() -> StatusCode {
        StatusCode::OK
    }

    async fn cached() -> ([(axum::http::HeaderName, &'static str); 1], StatusCode) {
        ([(CACHE_CONTROL, "no-cache")], StatusCode::OK)
    }

    fn app() -> Router {
        Router::new()
            .route("/health", get(ok))
            .route("/push-stream", get(cached))
            .layer(middleware::from_fn(super::apply))
    }

    async fn headers_for(uri: &str) -> axum::http::HeaderMap {
        app()
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed")
            .headers()
            .clone()
    }

    #[tokio::test]
    async fn apply_adds_security_headers() {
        let headers = headers_for("/health").await;
        assert_eq!(
            headers
                .get("x-content-type-options")
                .expect("x-content-type-options header should exist"),
            "nosniff"
        );
        assert_eq!(
            headers
                .get("x-frame-options")
                .expect("x-frame-options header should exist"),
            "DENY"
        );
        assert_eq!(
            headers
                .get("content-security-policy")
                .expect("content-security-policy header should exist"),
            "frame-ancestors 'none'"
        );
        assert_eq!(headers.get(CACHE_CONTROL).expect("cache-control"), "no-store");
    }

    #[tokio::test]
    async fn apply_keeps_existing_cache_policy() {
        let headers = headers_for("/push-stream").await;
        assert_eq!(headers.get(CACHE_CONTROL).expect("cache-control"), "no-cache");
    }
}
