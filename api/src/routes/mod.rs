use axum::http::HeaderMap;
use axum::http::header::HOST;

pub mod health;
pub mod push_stream;
pub mod rpc;

/// Header carrying the request/response session token in both directions.
pub const SESSION_ID_HEADER: &str = "session-id";

pub(crate) fn first_header_token(headers: &HeaderMap, key: &str) -> Option<String> {
    headers
        .get(key)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToOwned::to_owned)
}

/// Externally visible base URL of this server, derived from proxy headers
/// first and `Host` second.
pub(crate) fn request_base_url(headers: &HeaderMap, port: u16) -> String {
    let forwarded_proto = first_header_token(headers, "x-forwarded-proto");
    let forwarded_host = first_header_token(headers, "x-forwarded-host");
    let host = forwarded_host.or_else(|| {
        headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .map(ToOwned::to_owned)
    });

    if let Some(host) = host {
        let proto = forwarded_proto.unwrap_or_else(|| {
            if host.contains("localhost") || host.starts_with("127.0.0.1") {
                "http".to_string()
            } else {
                "https".to_string()
            }
        });
        return format!("{}://{}", proto.trim_end_matches(':'), host);
    }

    format!("http://localhost:{port}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_headers_win_over_host() {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("internal:3000"));
        headers.insert("x-forwarded-host", HeaderValue::from_static("sb.example, proxy"));
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        assert_eq!(request_base_url(&headers, 3000), "https://sb.example");
    }

    #[test]
    fn localhost_defaults_to_plain_http() {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("localhost:3000"));
        assert_eq!(request_base_url(&headers, 3000), "http://localhost:3000");
        assert_eq!(request_base_url(&HeaderMap::new(), 8080), "http://localhost:8080");
    }
}
