//! Client configuration.

use std::time::Duration;

use thiserror::Error;

pub const API_URL_ENV: &str = "CONSULT_FLOW_API_URL";
pub const API_TIMEOUT_ENV: &str = "CONSULT_FLOW_API_TIMEOUT_SECS";
pub const API_TOKEN_ENV: &str = "CONSULT_FLOW_API_TOKEN";

pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";

/// Client construction errors.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid value for {name}: {reason}")]
    InvalidConfig { name: &'static str, reason: String },

    #[error("HTTP client error: {0}")]
    Build(#[from] reqwest::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Where the clinic API lives and how to reach it.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    base_url: String,
    /// Per-request timeout; the transport default when absent
    timeout: Option<Duration>,
    bearer_token: Option<String>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> ClientResult<Self> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ClientError::InvalidConfig {
                name: "base_url",
                reason: "must not be empty".into(),
            });
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ClientError::InvalidConfig {
                name: "base_url",
                reason: format!("'{}' is not an http(s) URL", base_url),
            });
        }
        Ok(Self {
            base_url,
            timeout: None,
            bearer_token: None,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn from_env() -> ClientResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ClientResult<Self> {
        let mut config =
            Self::new(lookup(API_URL_ENV).unwrap_or_else(|| DEFAULT_API_URL.to_string()))?;

        if let Some(raw) = lookup(API_TIMEOUT_ENV) {
            let secs: u64 = raw
                .trim()
                .parse()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| ClientError::InvalidConfig {
                    name: API_TIMEOUT_ENV,
                    reason: format!("'{}' is not a positive number of seconds", raw),
                })?;
            config = config.with_timeout(Duration::from_secs(secs));
        }

        if let Some(token) = lookup(API_TOKEN_ENV).filter(|t| !t.trim().is_empty()) {
            config = config.with_bearer_token(token.trim());
        }

        Ok(config)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer_token.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.base_url(), "http://localhost:5000/api");
        assert_eq!(config.timeout(), None);
        assert_eq!(config.bearer_token(), None);
    }

    #[test]
    fn test_env_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            (API_URL_ENV, "https://clinic.example.org/api/"),
            (API_TIMEOUT_ENV, "15"),
            (API_TOKEN_ENV, "secret"),
        ]))
        .unwrap();
        assert_eq!(config.base_url(), "https://clinic.example.org/api");
        assert_eq!(config.timeout(), Some(Duration::from_secs(15)));
        assert_eq!(config.bearer_token(), Some("secret"));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(ClientConfig::new("  ").is_err());
        assert!(ClientConfig::new("localhost:5000").is_err());
        assert!(ClientConfig::from_lookup(lookup(&[(API_TIMEOUT_ENV, "0")])).is_err());
        assert!(ClientConfig::from_lookup(lookup(&[(API_TIMEOUT_ENV, "later")])).is_err());
    }
}
