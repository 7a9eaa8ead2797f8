//! Centralized configuration for the request layer.
//!
//! `NetworkConfig` holds the fixed defaults; `ClientConfig` is the runtime copy
//! handed to [`ApiClientBuilder`](crate::network::ApiClientBuilder).

use crate::error::{RequestError, Result};
use crate::network::RetryPolicy;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use std::time::Duration;

/// Network-related defaults.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const DEFAULT_BASE_URL: &'static str = "http://localhost:8080/api";
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
    pub const CACHE_TTL: Duration = Duration::from_secs(300);
    pub const MAX_RETRIES: u32 = 2;
    pub const RETRY_DELAY: Duration = Duration::from_secs(1);
    pub const METRICS_CAPACITY: usize = 100;
    pub const SLOW_REQUEST_THRESHOLD: Duration = Duration::from_millis(1000);
    pub const LOGIN_PATH: &'static str = "/login";
    pub const CONTENT_TYPE: &'static str = "application/json;charset=utf-8";
    pub const USER_AGENT: &'static str = "rapforum/0.1";
    pub const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

    /// Environment variable overriding the API base URL.
    pub const BASE_URL_ENV: &'static str = "RAPFORUM_API_BASE";
    /// Environment variable overriding the request timeout, in milliseconds.
    pub const TIMEOUT_ENV: &'static str = "RAPFORUM_API_TIMEOUT_MS";
}

/// Runtime configuration for an [`ApiClient`](crate::network::ApiClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL that relative request paths are joined onto.
    pub base_url: String,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Lifetime of cached GET payloads.
    pub cache_ttl: Duration,
    /// Retry behavior for timeouts and connectivity failures.
    pub retry: RetryPolicy,
    /// Number of request metrics kept.
    pub metrics_capacity: usize,
    /// Requests slower than this emit a warning.
    pub slow_request_threshold: Duration,
    /// Where the navigator is sent when the session expires.
    pub login_path: String,
    /// Headers sent with every request.
    pub default_headers: HeaderMap,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static(NetworkConfig::CONTENT_TYPE),
        );

        Self {
            base_url: NetworkConfig::DEFAULT_BASE_URL.to_string(),
            timeout: NetworkConfig::REQUEST_TIMEOUT,
            cache_ttl: NetworkConfig::CACHE_TTL,
            retry: RetryPolicy::default(),
            metrics_capacity: NetworkConfig::METRICS_CAPACITY,
            slow_request_threshold: NetworkConfig::SLOW_REQUEST_THRESHOLD,
            login_path: NetworkConfig::LOGIN_PATH.to_string(),
            default_headers,
        }
    }
}

impl ClientConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, overridden by `RAPFORUM_API_BASE` and `RAPFORUM_API_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(base_url) = std::env::var(NetworkConfig::BASE_URL_ENV) {
            if !base_url.trim().is_empty() {
                config.base_url = base_url.trim().to_string();
            }
        }

        if let Ok(raw) = std::env::var(NetworkConfig::TIMEOUT_ENV) {
            let millis = raw.trim().parse::<u64>().map_err(|e| RequestError::Config {
                message: format!("{} must be a number of milliseconds: {}", NetworkConfig::TIMEOUT_ENV, e),
            })?;
            config.timeout = Duration::from_millis(millis);
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the metrics buffer capacity.
    pub fn with_metrics_capacity(mut self, capacity: usize) -> Self {
        self.metrics_capacity = capacity;
        self
    }

    /// Set the login path used on session expiry.
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    /// Add a header sent with every request.
    pub fn with_default_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.default_headers.insert(name, value);
        self
    }

    /// Check the config is usable.
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.base_url).map_err(|e| RequestError::Config {
            message: format!("invalid base URL {:?}: {}", self.base_url, e),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RequestError::Config {
                message: format!("base URL must be http or https, got {}", url.scheme()),
            });
        }
        if self.timeout.is_zero() {
            return Err(RequestError::Config {
                message: "timeout must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Resolve a request URL against the base URL.
    ///
    /// Absolute `http(s)` URLs pass through unchanged.
    pub fn resolve_url(&self, path: &str) -> Result<url::Url> {
        let joined = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.is_empty() {
            self.base_url.clone()
        } else {
            format!(
                "{}/{}",
                self.base_url.trim_end_matches('/'),
                path.trim_start_matches('/')
            )
        };

        url::Url::parse(&joined)
            .map_err(|e| RequestError::InvalidRequest(format!("invalid URL {:?}: {}", joined, e)))
    }
}
