use std::path::Path;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use serde::Deserialize;
use switchboard_core::auth::{API_KEY_PREFIX, digests_match, hash_token, key_prefix};
use switchboard_core::identity::{Capability, Principal};
use uuid::Uuid;

use crate::config::ConfigError;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid token format")]
    InvalidFormat,
    #[error("invalid API key")]
    InvalidKey,
    #[error("credential store unavailable: {0}")]
    Unavailable(String),
}

/// Resolves a bearer credential into the calling agent.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<Principal, AuthError>;
}

/// One entry of the credential file. Only the SHA-256 of the key is stored.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialEntry {
    pub key_hash: String,
    pub agent_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub onboarded: bool,
}

/// Credential table loaded once from a JSON file.
#[derive(Debug)]
pub struct StaticKeyAuthProvider {
    entries: Vec<(String, Principal)>,
}

impl StaticKeyAuthProvider {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::KeysFile {
            path: path.to_path_buf(),
            source,
        })?;
        let entries: Vec<CredentialEntry> =
            serde_json::from_str(&raw).map_err(|source| ConfigError::KeysFormat {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_entries(entries)
    }

    pub fn from_entries(entries: Vec<CredentialEntry>) -> Result<Self, ConfigError> {
        let mut resolved = Vec::with_capacity(entries.len());
        for entry in entries {
            let mut principal =
                Principal::new(entry.agent_id, entry.name).with_onboarded(entry.onboarded);
            for tag in &entry.capabilities {
                let capability =
                    tag.parse::<Capability>()
                        .map_err(|source| ConfigError::Capability {
                            agent_id: entry.agent_id,
                            source,
                        })?;
                principal = principal.with_capability(capability);
            }
            resolved.push((entry.key_hash.trim().to_ascii_lowercase(), principal));
        }
        Ok(Self { entries: resolved })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[async_trait]
impl AuthProvider for StaticKeyAuthProvider {
    async fn authenticate(&self, token: &str) -> Result<Principal, AuthError> {
        if !token.starts_with(API_KEY_PREFIX) {
            return Err(AuthError::InvalidFormat);
        }
        let token_hash = hash_token(token);
        let matched = self
            .entries
            .iter()
            .fold(None, |found, (hash, principal)| {
                if digests_match(hash, &token_hash) {
                    Some(principal)
                } else {
                    found
                }
            });
        match matched {
            Some(principal) => Ok(principal.clone()),
            None => {
                tracing::info!(
                    event = "auth_rejected",
                    key_prefix = %key_prefix(token),
                    "Unknown API key"
                );
                Err(AuthError::InvalidKey)
            }
        }
    }
}

/// Extract the bearer token. The scheme is matched case-insensitively.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, &'static str> {
    let Some(raw) = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    else {
        return Err("Missing access token");
    };

    let mut parts = raw.splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default().trim();

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err("Invalid authorization scheme");
    }
    if token.is_empty() {
        return Err("Missing access token");
    }
    Ok(token.to_string())
}

/// The authenticated agent for this request. Rejection happens before the
/// body is read.
#[derive(Debug, Clone)]
pub struct AuthenticatedAgent(pub Principal);

impl FromRequestParts<AppState> for AuthenticatedAgent {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers).map_err(|message| {
            AppError::Unauthorized {
                message: message.to_string(),
                docs_hint: Some("Format: 'Authorization: Bearer sb_sk_...'".to_string()),
            }
        })?;

        match state.auth.authenticate(&token).await {
            Ok(principal) => Ok(AuthenticatedAgent(principal)),
            Err(AuthError::InvalidFormat) => Err(AppError::Unauthorized {
                message: "Invalid token format".to_string(),
                docs_hint: Some(format!("API keys start with '{API_KEY_PREFIX}'.")),
            }),
            Err(AuthError::InvalidKey) => Err(AppError::Unauthorized {
                message: "Invalid API key".to_string(),
                docs_hint: Some(
                    "Check that the key is correct and present in the credential file."
                        .to_string(),
                ),
            }),
            Err(AuthError::Unavailable(reason)) => Err(AppError::Internal(format!(
                "auth provider unavailable: {reason}"
            ))),
        }
    }
}
