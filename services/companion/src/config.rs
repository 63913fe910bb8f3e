//! Centralized configuration for the companion binary.
//!
//! All configuration is loaded from environment variables and validated
//! at startup. The client library configuration is included.

use secrecy::SecretString;
use std::env;
use std::path::PathBuf;
use toto_client::{ApiResult, ClientConfig};
use toto_common::TracingConfig;

/// Default location of the persisted session.
pub const DEFAULT_STATE_FILE: &str = "toto-session.json";

/// Companion configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API client settings
    pub client: ClientConfig,
    /// File the session is persisted in
    pub state_file: PathBuf,
    /// Account used when no session is stored
    pub email: Option<String>,
    /// Password of `email`
    pub password: Option<SecretString>,
    /// Log output settings
    pub tracing: TracingConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an invalid value.
    pub fn from_env() -> ApiResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an invalid value.
    pub fn from_lookup<F>(lookup: F) -> ApiResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let client = ClientConfig::from_lookup(&lookup)?;

        let mut tracing = TracingConfig::default();
        if let Some(level) = non_empty(lookup("TOTO_LOG_LEVEL")) {
            tracing = tracing.with_log_level(level);
        }
        if lookup("TOTO_LOG_JSON").is_some_and(|v| is_truthy(&v)) {
            tracing = tracing.with_json_output();
        }

        Ok(Self {
            client,
            state_file: non_empty(lookup("TOTO_STATE_FILE"))
                .map_or_else(|| PathBuf::from(DEFAULT_STATE_FILE), PathBuf::from),
            email: non_empty(lookup("TOTO_EMAIL")),
            password: non_empty(lookup("TOTO_PASSWORD")).map(SecretString::from),
            tracing,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
