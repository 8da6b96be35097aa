//! Session configuration.
//!
//! Resolved once at startup and passed into each session; nothing reads the
//! environment after that.

use std::time::Duration;

use thiserror::Error;

use crate::lab::DEFAULT_POLL_INTERVAL;

pub const POLL_INTERVAL_ENV: &str = "CONSULT_FLOW_POLL_INTERVAL_SECS";
pub const ENFORCE_LAB_CATALOG_ENV: &str = "CONSULT_FLOW_ENFORCE_LAB_CATALOG";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

/// Per-session settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Time between lab status checks
    poll_interval: Duration,
    /// Reject lab requests for tests missing from a loaded catalog
    enforce_lab_catalog: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            enforce_lab_catalog: true,
        }
    }
}

impl SessionConfig {
    pub fn new(poll_interval: Duration, enforce_lab_catalog: bool) -> Result<Self, ConfigError> {
        if poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "poll_interval",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(Self {
            poll_interval,
            enforce_lab_catalog,
        })
    }

    /// Defaults overridden by environment variables, where set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let poll_interval = match lookup(POLL_INTERVAL_ENV) {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    name: POLL_INTERVAL_ENV,
                    reason: format!("'{}' is not a whole number of seconds", raw),
                })?;
                Duration::from_secs(secs)
            }
            None => defaults.poll_interval,
        };

        let enforce_lab_catalog = match lookup(ENFORCE_LAB_CATALOG_ENV) {
            Some(raw) => parse_flag(&raw).ok_or_else(|| ConfigError::InvalidValue {
                name: ENFORCE_LAB_CATALOG_ENV,
                reason: format!("'{}' is not a boolean", raw),
            })?,
            None => defaults.enforce_lab_catalog,
        };

        Self::new(poll_interval, enforce_lab_catalog)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn enforce_lab_catalog(&self) -> bool {
        self.enforce_lab_catalog
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
