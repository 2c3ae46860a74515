use axum::Json;
use axum::http::header::WWW_AUTHENTICATE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use switchboard_core::error::{self, ApiError};

/// Internal error type that converts to structured API responses
#[derive(Debug)]
pub enum AppError {
    /// Validation error (400)
    Validation {
        message: String,
        field: Option<String>,
        received: Option<serde_json::Value>,
        docs_hint: Option<String>,
    },
    /// Missing or rejected credential (401, with a Bearer challenge)
    Unauthorized {
        message: String,
        docs_hint: Option<String>,
    },
    /// Unknown or foreign session (404)
    NotFound {
        message: String,
        field: Option<String>,
        docs_hint: Option<String>,
    },
    /// Internal error (500)
    Internal(String),
}

impl AppError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            field: Some(field.to_string()),
            received: None,
            docs_hint: None,
        }
    }

    pub fn session_not_found(field: &str) -> Self {
        AppError::NotFound {
            message: "Session not found".to_string(),
            field: Some(field.to_string()),
            docs_hint: Some(
                "The session is closed, expired, or owned by another agent. \
                 Open a new push stream or call initialize on /rpc."
                    .to_string(),
            ),
        }
    }
}

fn bearer_challenge(description: &str) -> Option<HeaderValue> {
    let description = description.replace('"', "'");
    HeaderValue::from_str(&format!(
        "Bearer realm=\"switchboard\", error=\"invalid_token\", error_description=\"{description}\""
    ))
    .ok()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();

        let (status, api_error, challenge) = match self {
            AppError::Validation {
                message,
                field,
                received,
                docs_hint,
            } => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    error: error::codes::VALIDATION_FAILED.to_string(),
                    message,
                    field,
                    received,
                    request_id,
                    docs_hint,
                },
                None,
            ),
            AppError::Unauthorized { message, docs_hint } => {
                let challenge = bearer_challenge(&message);
                (
                    StatusCode::UNAUTHORIZED,
                    ApiError {
                        error: error::codes::UNAUTHORIZED.to_string(),
                        message,
                        field: Some("authorization".to_string()),
                        received: None,
                        request_id,
                        docs_hint,
                    },
                    challenge,
                )
            }
            AppError::NotFound {
                message,
                field,
                docs_hint,
            } => (
                StatusCode::NOT_FOUND,
                ApiError {
                    error: error::codes::NOT_FOUND.to_string(),
                    message,
                    field,
                    received: None,
                    request_id,
                    docs_hint,
                },
                None,
            ),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: error::codes::INTERNAL_ERROR.to_string(),
                        message: "An internal error occurred".to_string(),
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: None,
                    },
                    None,
                )
            }
        };

        let mut response = (status, Json(api_error)).into_response();
        if let Some(challenge) = challenge {
            response.headers_mut().insert(WWW_AUTHENTICATE, challenge);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_carries_bearer_challenge() {
        let response = AppError::Unauthorized {
            message: "Missing \"access\" token".to_string(),
            docs_hint: None,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .unwrap();
        assert!(challenge.starts_with("Bearer realm=\"switchboard\""));
        assert!(challenge.contains("error_description=\"Missing 'access' token\""));
    }

    #[test]
    fn not_found_has_no_challenge() {
        let response = AppError::session_not_found("session").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get(WWW_AUTHENTICATE).is_none());
    }
}
