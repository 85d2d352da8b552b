//! Relay configuration.
//!
//! Values come from the environment (the same keys the rest of the platform
//! uses) or from any deserializer. The loops never read raw intervals: they
//! go through the effective accessors, which apply the lower bounds.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::review::ReviewerId;

/// Notification channel the producers publish on.
pub const DEFAULT_NOTIFY_CHANNEL: &str = "review_dispatch";

const MIN_FALLBACK_SECS: u64 = 5;
const MIN_LISTENER_RETRY_SECS: u64 = 3;

/// Relay configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Pub/sub channel carrying dispatch and access-sync notifications.
    pub notify_channel: String,
    /// Maximum items fetched per kind per dispatch pass.
    pub batch_limit: usize,
    /// Dispatch wakes at least this often even without notifications.
    pub fallback_interval_secs: u64,
    /// Delay between listener reconnect attempts.
    pub listener_retry_secs: u64,
    /// Upper bound on a single remote decision call.
    pub decision_timeout_secs: u64,
    /// Always-allowed identity, never tracked or revoked.
    pub super_reviewer: Option<ReviewerId>,
    /// Base URL of the internal decision API.
    pub decision_api_base_url: String,
    /// Token sent as `X-Internal-Token`. Empty means decisions are disabled.
    pub decision_api_token: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            notify_channel: DEFAULT_NOTIFY_CHANNEL.to_string(),
            batch_limit: 20,
            fallback_interval_secs: 15,
            listener_retry_secs: 5,
            decision_timeout_secs: 20,
            super_reviewer: None,
            decision_api_base_url: "http://localhost:8080".to_string(),
            decision_api_token: String::new(),
        }
    }
}

impl RelayConfig {
    /// Reads configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for values that do not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through an arbitrary key lookup.
    ///
    /// Unset or blank keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for values that do not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut cfg = Self::default();

        if let Some(v) = get("REVIEW_NOTIFY_CHANNEL") {
            cfg.notify_channel = v;
        }
        if let Some(v) = get("REVIEW_BATCH_LIMIT") {
            cfg.batch_limit = parse_number("REVIEW_BATCH_LIMIT", &v)?;
        }
        if let Some(v) = get("REVIEW_FALLBACK_SECONDS") {
            cfg.fallback_interval_secs = parse_number("REVIEW_FALLBACK_SECONDS", &v)?;
        }
        if let Some(v) = get("REVIEW_LISTENER_RETRY_SECONDS") {
            cfg.listener_retry_secs = parse_number("REVIEW_LISTENER_RETRY_SECONDS", &v)?;
        }
        if let Some(v) = get("REVIEW_DECISION_TIMEOUT_SECONDS") {
            cfg.decision_timeout_secs = parse_number("REVIEW_DECISION_TIMEOUT_SECONDS", &v)?;
        }
        if let Some(v) = get("OWNER_TELEGRAM_ID") {
            let raw: i64 = parse_number("OWNER_TELEGRAM_ID", &v)?;
            cfg.super_reviewer = Some(ReviewerId::new(raw)).filter(|id| id.is_valid());
        }
        if let Some(v) = get("API_BASE_URL") {
            cfg.decision_api_base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("INTERNAL_API_TOKEN") {
            cfg.decision_api_token = v;
        }

        Ok(cfg)
    }

    /// Checks values that have no sensible clamp.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when the notify channel is blank or the decision
    /// timeout is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.notify_channel.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "REVIEW_NOTIFY_CHANNEL".to_string(),
                value: self.notify_channel.clone(),
            });
        }
        if self.decision_timeout_secs == 0 {
            return Err(ConfigError::OutOfRange {
                key: "REVIEW_DECISION_TIMEOUT_SECONDS".to_string(),
                min: 1,
                actual: 0,
            });
        }
        Ok(())
    }

    /// Batch limit, at least 1.
    #[must_use]
    pub fn effective_batch_limit(&self) -> usize {
        self.batch_limit.max(1)
    }

    /// Dispatch fallback wake interval, at least 5s.
    #[must_use]
    pub fn fallback_interval(&self) -> Duration {
        Duration::from_secs(self.fallback_interval_secs.max(MIN_FALLBACK_SECS))
    }

    /// Listener reconnect interval, at least 3s.
    #[must_use]
    pub fn listener_retry_interval(&self) -> Duration {
        Duration::from_secs(self.listener_retry_secs.max(MIN_LISTENER_RETRY_SECS))
    }

    /// Bound on one remote decision call.
    #[must_use]
    pub fn decision_timeout(&self) -> Duration {
        Duration::from_secs(self.decision_timeout_secs.max(1))
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}
