use std::path::PathBuf;
use std::time::Duration;

use switchboard_core::identity::UnknownCapability;
use switchboard_mcp_runtime::RegistryConfig;
use url::Url;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_KEYS_FILE: &str = "switchboard-keys.json";
const DEFAULT_KEEPALIVE_SECS: u64 = 15;
const DEFAULT_SESSION_TTL_SECS: u64 = 300;
const DEFAULT_OUTBOUND_QUEUE: u64 = 64;
const DEFAULT_REAP_INTERVAL_SECS: u64 = 30;
const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3000";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read credential file {path}: {source}")]
    KeysFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("credential file {path} is not valid JSON: {source}")]
    KeysFormat {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("credential for agent {agent_id}: {source}")]
    Capability {
        agent_id: uuid::Uuid,
        source: UnknownCapability,
    },
    #[error("SWITCHBOARD_PUBLIC_URL must be an absolute http(s) URL, got '{0}'")]
    PublicUrl(String),
}

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub keys_file: PathBuf,
    pub keepalive: Duration,
    pub session_ttl: Duration,
    pub outbound_queue: usize,
    pub reap_interval: Duration,
    pub cors_origins: Vec<String>,
    /// Base URL used in the push-stream endpoint frame. Derived from request
    /// headers when unset.
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            keys_file: PathBuf::from(DEFAULT_KEYS_FILE),
            keepalive: Duration::from_secs(DEFAULT_KEEPALIVE_SECS),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            outbound_queue: DEFAULT_OUTBOUND_QUEUE as usize,
            reap_interval: Duration::from_secs(DEFAULT_REAP_INTERVAL_SECS),
            cors_origins: parse_origins(DEFAULT_CORS_ORIGINS),
            public_url: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = lookup("PORT")
            .and_then(|raw| raw.trim().parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        let keys_file = lookup("SWITCHBOARD_KEYS_FILE")
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_KEYS_FILE));

        let keepalive = parse_env_u64_with_bounds(
            "SWITCHBOARD_KEEPALIVE_SECS",
            lookup("SWITCHBOARD_KEEPALIVE_SECS"),
            1,
            300,
            DEFAULT_KEEPALIVE_SECS,
        );
        let session_ttl = parse_env_u64_with_bounds(
            "SWITCHBOARD_SESSION_TTL_SECS",
            lookup("SWITCHBOARD_SESSION_TTL_SECS"),
            10,
            86_400,
            DEFAULT_SESSION_TTL_SECS,
        );
        let outbound_queue = parse_env_u64_with_bounds(
            "SWITCHBOARD_OUTBOUND_QUEUE",
            lookup("SWITCHBOARD_OUTBOUND_QUEUE"),
            1,
            10_000,
            DEFAULT_OUTBOUND_QUEUE,
        );
        let reap_interval = parse_env_u64_with_bounds(
            "SWITCHBOARD_REAP_INTERVAL_SECS",
            lookup("SWITCHBOARD_REAP_INTERVAL_SECS"),
            1,
            3_600,
            DEFAULT_REAP_INTERVAL_SECS,
        );

        let cors_origins = parse_origins(
            &lookup("SWITCHBOARD_CORS_ORIGINS").unwrap_or_else(|| DEFAULT_CORS_ORIGINS.to_string()),
        );

        let public_url = match lookup("SWITCHBOARD_PUBLIC_URL")
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
        {
            Some(raw) => Some(validate_public_url(&raw)?),
            None => None,
        };

        Ok(Self {
            port,
            keys_file,
            keepalive: Duration::from_secs(keepalive),
            session_ttl: Duration::from_secs(session_ttl),
            outbound_queue: outbound_queue as usize,
            reap_interval: Duration::from_secs(reap_interval),
            cors_origins,
            public_url,
        })
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            session_ttl: self.session_ttl,
            outbound_capacity: self.outbound_queue,
        }
    }
}

/// Values outside `min..=max`, or unparseable ones, fall back to `default`.
fn parse_env_u64_with_bounds(
    key: &str,
    raw: Option<String>,
    min: u64,
    max: u64,
    default: u64,
) -> u64 {
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse::<u64>() {
        Ok(parsed) if (min..=max).contains(&parsed) => parsed,
        _ => {
            tracing::warn!(
                key,
                value = %raw,
                min,
                max,
                default,
                "Ignoring out-of-range configuration value"
            );
            default
        }
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn validate_public_url(raw: &str) -> Result<String, ConfigError> {
    let parsed = Url::parse(raw).map_err(|_| ConfigError::PublicUrl(raw.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(ConfigError::PublicUrl(raw.to_string()));
    }
    Ok(raw.trim_end_matches('/').to_string())
}
