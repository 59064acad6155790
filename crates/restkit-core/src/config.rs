use std::collections::BTreeMap;
use std::env;

use crate::error::ConfigError;
use crate::http_client::HttpAuth;
use crate::retry::RetryConfig;
use crate::throttling::RateLimit;

pub const BASE_URL_ENV: &str = "RESTKIT_BASE_URL";
pub const TIMEOUT_MS_ENV: &str = "RESTKIT_TIMEOUT_MS";
pub const BEARER_TOKEN_ENV: &str = "RESTKIT_BEARER_TOKEN";

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Settings for one API client: where to send requests and how.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    base_url: String,
    headers: BTreeMap<String, String>,
    auth: HttpAuth,
    timeout_ms: u64,
    retry: RetryConfig,
    rate_limit: Option<RateLimit>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ConfigError> {
        let base_url = base_url.into();
        let trimmed = base_url.trim().trim_end_matches('/');
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl { value: base_url });
        }

        Ok(Self {
            base_url: trimmed.to_owned(),
            headers: BTreeMap::new(),
            auth: HttpAuth::None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retry: RetryConfig::default(),
            rate_limit: None,
        })
    }

    /// Reads `RESTKIT_BASE_URL` (required), `RESTKIT_TIMEOUT_MS` and
    /// `RESTKIT_BEARER_TOKEN`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(None, |name| env::var(name).ok())
    }

    /// Same as [`ClientConfig::from_env`] with `base_url` in place of
    /// `RESTKIT_BASE_URL`.
    pub fn from_env_with_base_url(base_url: impl Into<String>) -> Result<Self, ConfigError> {
        Self::from_lookup(Some(base_url.into()), |name| env::var(name).ok())
    }

    fn from_lookup<F>(base_url: Option<String>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = base_url
            .or_else(|| lookup(BASE_URL_ENV))
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::MissingBaseUrl)?;
        let mut config = Self::new(base_url)?;

        if let Some(raw) = lookup(TIMEOUT_MS_ENV) {
            let timeout_ms = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidTimeout { value: raw.clone() })?;
            config = config.with_timeout_ms(timeout_ms)?;
        }

        if let Some(token) = lookup(BEARER_TOKEN_ENV) {
            if !token.trim().is_empty() {
                config = config.with_auth(HttpAuth::BearerToken(token));
            }
        }

        Ok(config)
    }

    pub fn with_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        if !is_header_token(&name) {
            return Err(ConfigError::InvalidHeader { name });
        }
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        Ok(self)
    }

    pub fn with_auth(mut self, auth: HttpAuth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Result<Self, ConfigError> {
        if timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout {
                value: timeout_ms.to_string(),
            });
        }
        self.timeout_ms = timeout_ms;
        Ok(self)
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn auth(&self) -> &HttpAuth {
        &self.auth
    }

    pub const fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    pub const fn rate_limit(&self) -> Option<RateLimit> {
        self.rate_limit
    }
}

/// Per-call overrides layered over the client configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    pub timeout_ms: Option<u64>,
}

impl CallOptions {
    pub const fn with_timeout_ms(timeout_ms: u64) -> Self {
        Self {
            timeout_ms: Some(timeout_ms),
        }
    }
}

fn is_header_token(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&byte))
}
