//! Client configuration loaded from the environment.
//!
//! The detection service lives at a fixed address. The address and an optional
//! request timeout can be overridden through environment variables (or a
//! `.env` file loaded with `dotenv`), which is how other deployments and the
//! test suite point the client elsewhere.

use std::{env, time::Duration};

use reqwest::Url;
use thiserror::Error;

/// Address of the detection service when nothing else is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";

/// Environment variable overriding [`DEFAULT_API_URL`].
pub const API_URL_VAR: &str = "DETECTA_API_URL";

/// Environment variable setting a request timeout in whole seconds.
pub const TIMEOUT_VAR: &str = "DETECTA_TIMEOUT_SECS";

/// Errors raised while reading client configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid API base URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("invalid DETECTA_TIMEOUT_SECS value {0:?}: expected a positive number of seconds")]
    InvalidTimeout(String),
}

/// Settings used to build a [`crate::DetectionClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base address every endpoint path is appended to, always an absolute
    /// `http` or `https` URL
    pub api_url: String,
    /// Per-request timeout; `None` waits indefinitely
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            timeout: None,
        }
    }
}

impl ClientConfig {
    /// Builds a configuration for the given base address.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidUrl`] unless `api_url` is an absolute
    /// `http` or `https` URL.
    pub fn with_api_url(api_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            api_url: parse_api_url(api_url)?,
            ..Self::default()
        })
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reads the configuration from the process environment.
    ///
    /// Loads `.env` if present, then reads:
    /// - `DETECTA_API_URL`: base address (default `http://localhost:8000/api`)
    /// - `DETECTA_TIMEOUT_SECS`: optional timeout in seconds
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if either variable holds an unusable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url = match lookup(API_URL_VAR) {
            Some(url) if !url.trim().is_empty() => parse_api_url(&url)?,
            _ => Self::default().api_url,
        };

        let timeout = match lookup(TIMEOUT_VAR) {
            Some(raw) if !raw.trim().is_empty() => Some(parse_timeout(&raw)?),
            _ => None,
        };

        Ok(Self { api_url, timeout })
    }

    /// Full URL of the endpoint at `path` (e.g. `/detect/audio`).
    pub fn endpoint_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn parse_api_url(raw: &str) -> Result<String, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(raw.trim().to_string()),
        other => Err(invalid(format!("unsupported scheme {other:?}"))),
    }
}

fn parse_timeout(raw: &str) -> Result<Duration, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidTimeout(raw.to_string())),
    }
}
