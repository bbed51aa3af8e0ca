//! Relay configuration.
//!
//! Defaults follow the production cadence: poll every 60 seconds, at most 100
//! messages per iteration, dead-letter after 5 failed attempts. Every value can
//! be overridden through environment variables.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const ENV_POLL_INTERVAL_SECS: &str = "PEOPLEHUB_OUTBOX_POLL_INTERVAL_SECS";
pub const ENV_BATCH_SIZE: &str = "PEOPLEHUB_OUTBOX_BATCH_SIZE";
pub const ENV_MAX_ATTEMPTS: &str = "PEOPLEHUB_OUTBOX_MAX_ATTEMPTS";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

/// Outbox relay configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Fixed delay between iterations.
    pub poll_interval: Duration,
    /// Maximum messages selected per iteration.
    pub batch_size: usize,
    /// Failed attempts after which a message is dead-lettered.
    pub max_attempts: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            batch_size: 100,
            max_attempts: 5,
        }
    }
}

impl RelayConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Read overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through `lookup`; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(secs) = parse::<u64>(&lookup, ENV_POLL_INTERVAL_SECS)? {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(batch_size) = parse(&lookup, ENV_BATCH_SIZE)? {
            config.batch_size = batch_size;
        }
        if let Some(max_attempts) = parse(&lookup, ENV_MAX_ATTEMPTS)? {
            config.max_attempts = max_attempts;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: ENV_POLL_INTERVAL_SECS,
                value: "0".into(),
            });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: ENV_BATCH_SIZE,
                value: "0".into(),
            });
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: ENV_MAX_ATTEMPTS,
                value: "0".into(),
            });
        }
        Ok(())
    }
}

/// Parse an optional setting; blank values count as unset.
pub fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        _ => Ok(None),
    }
}
