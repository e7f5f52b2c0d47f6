use std::path::PathBuf;
use std::time::Duration;

use talkgen_core::polling::{
    PollConfig, DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL_MS,
};
use talkgen_provider::did::{DEFAULT_API_URL, DEFAULT_REQUEST_TIMEOUT};
use talkgen_provider::DidConfig;

use crate::auth::jwt::JwtConfig;

/// Where finished videos are written.
#[derive(Debug, Clone)]
pub enum StorageBackend {
    /// A local directory served by a static host.
    Local { root: PathBuf },
    /// An S3 (or compatible) bucket.
    S3 {
        bucket: String,
        endpoint_url: Option<String>,
    },
}

/// Blob storage configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Origin the stored objects are publicly served from.
    pub public_base_url: String,
}

/// Server configuration loaded from environment variables.
///
/// Defaults suit local development. Only the secrets are required.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Postgres URL. Without it jobs live in memory.
    pub database_url: Option<String>,
    /// Externally reachable origin of this service, used for webhook URLs.
    pub public_base_url: Option<String>,
    /// D-ID connection settings.
    pub provider: DidConfig,
    pub storage: StorageConfig,
    /// Status polling schedule.
    pub poll: PollConfig,
    /// Start a background polling loop right after each successful submit.
    pub poll_after_submit: bool,
    /// JWT token configuration.
    pub jwt: JwtConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                    |
    /// |---------------------------|----------------------------|
    /// | `HOST`                    | `0.0.0.0`                  |
    /// | `PORT`                    | `3000`                     |
    /// | `CORS_ORIGINS`            | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`                       |
    /// | `DATABASE_URL`            | unset (in-memory store)    |
    /// | `PUBLIC_BASE_URL`         | unset (no webhooks)        |
    /// | `DID_API_URL`             | `https://api.d-id.com`     |
    /// | `DID_API_KEY`             | **required**               |
    /// | `ELEVENLABS_API_KEY`      | unset                      |
    /// | `STORAGE_BACKEND`         | `local`                    |
    /// | `STORAGE_LOCAL_ROOT`      | `./media`                  |
    /// | `STORAGE_PUBLIC_BASE_URL` | `http://localhost:3000/media` |
    /// | `S3_BUCKET`               | required for `s3`          |
    /// | `S3_ENDPOINT_URL`         | unset                      |
    /// | `POLL_INITIAL_DELAY_MS`   | `5000`                     |
    /// | `POLL_INTERVAL_MS`        | `3000`                     |
    /// | `POLL_MAX_ATTEMPTS`       | `20`                       |
    /// | `POLL_AFTER_SUBMIT`       | `true`                     |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = env_or("PORT", 3000);

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = env_or("REQUEST_TIMEOUT_SECS", 30);

        let provider = DidConfig {
            api_url: std::env::var("DID_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into()),
            api_key: std::env::var("DID_API_KEY").expect("DID_API_KEY must be set"),
            elevenlabs_api_key: optional_env("ELEVENLABS_API_KEY"),
            request_timeout: Duration::from_secs(env_or(
                "DID_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT.as_secs(),
            )),
        };

        let backend = match std::env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "local".into())
            .as_str()
        {
            "local" => StorageBackend::Local {
                root: std::env::var("STORAGE_LOCAL_ROOT")
                    .unwrap_or_else(|_| "./media".into())
                    .into(),
            },
            "s3" => StorageBackend::S3 {
                bucket: std::env::var("S3_BUCKET").expect("S3_BUCKET must be set for s3 storage"),
                endpoint_url: optional_env("S3_ENDPOINT_URL"),
            },
            other => panic!("STORAGE_BACKEND must be 'local' or 's3', got '{other}'"),
        };
        let storage = StorageConfig {
            backend,
            public_base_url: std::env::var("STORAGE_PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000/media".into()),
        };

        let poll = PollConfig::from_millis(
            env_or("POLL_INITIAL_DELAY_MS", DEFAULT_INITIAL_DELAY_MS),
            env_or("POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS),
            env_or("POLL_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS),
        );

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            database_url: optional_env("DATABASE_URL"),
            public_base_url: optional_env("PUBLIC_BASE_URL"),
            provider,
            storage,
            poll,
            poll_after_submit: env_or("POLL_AFTER_SUBMIT", true),
            jwt: JwtConfig::from_env(),
        }
    }
}

/// Read and parse `key`, falling back to `default` when unset.
///
/// Panics on an unparsable value so misconfiguration fails at startup.
fn env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|e| panic!("{key} has an invalid value '{raw}': {e}")),
        Err(_) => default,
    }
}

/// Read `key`, treating an empty value as unset.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
