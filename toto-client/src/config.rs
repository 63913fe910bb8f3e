//! API client configuration.
//!
//! Values come from the environment (and a `.env` file, if present) and are
//! validated before any client is built.

use std::env;
use std::time::Duration;
use toto_common::{ApiError, ApiResult, HttpConfig, RetryConfig};
use url::Url;

/// Default API location for local development.
pub const DEFAULT_API_URL: &str = "http://localhost:3000/api";

/// API client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL every request path is joined to; always ends with `/`
    pub base_url: Url,
    /// HTTP client settings
    pub http: HttpConfig,
    /// Backoff schedule of the profile loader
    pub retry: RetryConfig,
}

impl ClientConfig {
    /// Create a configuration for `base_url` with default HTTP and retry settings.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not an absolute http(s) URL.
    pub fn new(base_url: &str) -> ApiResult<Self> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            http: HttpConfig::default(),
            retry: RetryConfig::default(),
        })
    }

    /// Load configuration from environment variables.
    ///
    /// Reads `TOTO_API_URL`, `TOTO_HTTP_TIMEOUT_SECS` and
    /// `TOTO_CONNECT_TIMEOUT_SECS`.
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
        let base_url = lookup("TOTO_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let mut config = Self::new(&base_url)?;

        let timeout = parse_var(&lookup, "TOTO_HTTP_TIMEOUT_SECS", config.http.timeout.as_secs())?;
        let connect_timeout = parse_var(
            &lookup,
            "TOTO_CONNECT_TIMEOUT_SECS",
            config.http.connect_timeout.as_secs(),
        )?;
        if timeout == 0 {
            return Err(ApiError::invalid_config("TOTO_HTTP_TIMEOUT_SECS must be positive"));
        }

        config.http = config
            .http
            .with_timeout(Duration::from_secs(timeout))
            .with_connect_timeout(Duration::from_secs(connect_timeout));
        Ok(config)
    }

    /// Set the HTTP settings.
    #[must_use]
    pub fn with_http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    /// Set the loader's retry schedule.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Resolve a request path against the base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be joined.
    pub fn endpoint(&self, path: &str) -> ApiResult<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::invalid_config(format!("Invalid request path {path}: {e}")))
    }
}

fn parse_base_url(raw: &str) -> ApiResult<Url> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| ApiError::invalid_config(format!("Invalid API URL {raw}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ApiError::invalid_config(format!(
            "API URL must use http or https, got {}",
            url.scheme()
        )));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> ApiResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(val) => val
            .trim()
            .parse()
            .map_err(|e| ApiError::invalid_config(format!("Invalid {name}: {e}"))),
        None => Ok(default),
    }
}
