//! Configuration loading for the integration service.
//!
//! Loads `.env` values and environment variables prefixed with
//! `INTEGRATIONS_`, producing a typed [`AppConfig`]. Process environment
//! always wins over dotenv layers.

use std::collections::BTreeMap;
use std::env;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const ENV_PREFIX: &str = "INTEGRATIONS_";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid public base URL '{value}'")]
    InvalidBaseUrl { value: String },
    #[error("crypto secret must not be empty")]
    EmptyCryptoSecret,
    #[error("HTTP timeout must be between 1 and 300 seconds, got {value}")]
    InvalidHttpTimeout { value: u64 },
    #[error("oauth state TTL must be between 60 and 3600 seconds, got {value}")]
    InvalidStateTtl { value: u64 },
    #[error("token refresh tick must be at least 60 seconds, got {value}")]
    InvalidTickInterval { value: u64 },
    #[error("token refresh lead time must be between 60 and 86400 seconds, got {value}")]
    InvalidLeadTime { value: u64 },
    #[error("token refresh jitter factor must be within 0.0..=1.0, got {value}")]
    InvalidJitterFactor { value: f64 },
    #[error("value for {key} is not a number: '{value}'")]
    UnparseableNumber { key: &'static str, value: String },
}

/// Application configuration derived from `INTEGRATIONS_*` environment
/// variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Public origin this service is reachable at; provider callback paths
    /// are appended to it when a configuration carries no redirect URI.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    /// Operator secret the at-rest token encryption key is derived from.
    #[serde(default = "default_crypto_secret")]
    pub crypto_secret: String,
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,
    /// How long an issued CSRF state stays redeemable.
    #[serde(default = "default_oauth_state_ttl_seconds")]
    pub oauth_state_ttl_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_token_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack_token_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_token_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jira_token_url: Option<String>,
    #[serde(default)]
    pub token_refresh: TokenRefreshConfig,
}

/// Token refresh sweep configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct TokenRefreshConfig {
    /// Sweep interval in seconds (default: 300).
    #[serde(default = "default_token_refresh_tick_seconds")]
    pub tick_seconds: u64,
    /// Lookahead window before expiry that triggers a refresh (default: 600).
    #[serde(default = "default_token_refresh_lead_time_seconds")]
    pub lead_time_seconds: u64,
    /// Per-item jitter as a fraction of the lead time, to avoid a
    /// thundering herd against provider endpoints (default: 0.0).
    #[serde(default = "default_token_refresh_jitter_factor")]
    pub jitter_factor: f64,
}

impl AppConfig {
    /// Load configuration from `.env` files and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut values = BTreeMap::new();

        if let Ok(iter) = dotenvy::dotenv_iter() {
            for (key, value) in iter.flatten() {
                if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                    values.insert(stripped.to_string(), value);
                }
            }
        }

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                values.insert(stripped.to_string(), value);
            }
        }

        Self::from_map(values)
    }

    /// Build a configuration from pre-stripped key/value pairs.
    ///
    /// Absent or empty values fall back to defaults; a value that is present
    /// but does not parse is an error, so an operator typo never silently
    /// reverts to a default.
    pub fn from_map(mut values: BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let take = |values: &mut BTreeMap<String, String>, key: &str| {
            values.remove(key).filter(|v| !v.is_empty())
        };

        let config = Self {
            log_level: take(&mut values, "LOG_LEVEL").unwrap_or_else(default_log_level),
            log_format: take(&mut values, "LOG_FORMAT").unwrap_or_else(default_log_format),
            public_base_url: take(&mut values, "PUBLIC_BASE_URL")
                .unwrap_or_else(default_public_base_url),
            crypto_secret: take(&mut values, "CRYPTO_SECRET")
                .unwrap_or_else(default_crypto_secret),
            http_timeout_seconds: parse_number(
                "HTTP_TIMEOUT_SECONDS",
                take(&mut values, "HTTP_TIMEOUT_SECONDS"),
                default_http_timeout_seconds,
            )?,
            oauth_state_ttl_seconds: parse_number(
                "OAUTH_STATE_TTL_SECONDS",
                take(&mut values, "OAUTH_STATE_TTL_SECONDS"),
                default_oauth_state_ttl_seconds,
            )?,
            github_token_url: take(&mut values, "GITHUB_TOKEN_URL"),
            slack_token_url: take(&mut values, "SLACK_TOKEN_URL"),
            google_token_url: take(&mut values, "GOOGLE_TOKEN_URL"),
            jira_token_url: take(&mut values, "JIRA_TOKEN_URL"),
            token_refresh: TokenRefreshConfig {
                tick_seconds: parse_number(
                    "TOKEN_REFRESH_TICK_SECONDS",
                    take(&mut values, "TOKEN_REFRESH_TICK_SECONDS"),
                    default_token_refresh_tick_seconds,
                )?,
                lead_time_seconds: parse_number(
                    "TOKEN_REFRESH_LEAD_TIME_SECONDS",
                    take(&mut values, "TOKEN_REFRESH_LEAD_TIME_SECONDS"),
                    default_token_refresh_lead_time_seconds,
                )?,
                jitter_factor: parse_number(
                    "TOKEN_REFRESH_JITTER_FACTOR",
                    take(&mut values, "TOKEN_REFRESH_JITTER_FACTOR"),
                    default_token_refresh_jitter_factor,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if Url::parse(&self.public_base_url).is_err() {
            return Err(ConfigError::InvalidBaseUrl {
                value: self.public_base_url.clone(),
            });
        }
        if self.crypto_secret.trim().is_empty() {
            return Err(ConfigError::EmptyCryptoSecret);
        }
        if self.http_timeout_seconds == 0 || self.http_timeout_seconds > 300 {
            return Err(ConfigError::InvalidHttpTimeout {
                value: self.http_timeout_seconds,
            });
        }
        if self.oauth_state_ttl_seconds < 60 || self.oauth_state_ttl_seconds > 3600 {
            return Err(ConfigError::InvalidStateTtl {
                value: self.oauth_state_ttl_seconds,
            });
        }
        self.token_refresh.validate()
    }
}

impl TokenRefreshConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_seconds < 60 {
            return Err(ConfigError::InvalidTickInterval {
                value: self.tick_seconds,
            });
        }
        if self.lead_time_seconds < 60 || self.lead_time_seconds > 86400 {
            return Err(ConfigError::InvalidLeadTime {
                value: self.lead_time_seconds,
            });
        }
        if self.jitter_factor < 0.0 || self.jitter_factor > 1.0 {
            return Err(ConfigError::InvalidJitterFactor {
                value: self.jitter_factor,
            });
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            public_base_url: default_public_base_url(),
            crypto_secret: default_crypto_secret(),
            http_timeout_seconds: default_http_timeout_seconds(),
            oauth_state_ttl_seconds: default_oauth_state_ttl_seconds(),
            github_token_url: None,
            slack_token_url: None,
            google_token_url: None,
            jira_token_url: None,
            token_refresh: TokenRefreshConfig::default(),
        }
    }
}

impl Default for TokenRefreshConfig {
    fn default() -> Self {
        Self {
            tick_seconds: default_token_refresh_tick_seconds(),
            lead_time_seconds: default_token_refresh_lead_time_seconds(),
            jitter_factor: default_token_refresh_jitter_factor(),
        }
    }
}

fn parse_number<T: std::str::FromStr>(
    key: &'static str,
    value: Option<String>,
    default: fn() -> T,
) -> Result<T, ConfigError> {
    match value {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::UnparseableNumber { key, value: raw }),
        None => Ok(default()),
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_crypto_secret() -> String {
    "local-dev-crypto-secret".to_string()
}

fn default_http_timeout_seconds() -> u64 {
    10
}

fn default_oauth_state_ttl_seconds() -> u64 {
    600
}

fn default_token_refresh_tick_seconds() -> u64 {
    300
}

fn default_token_refresh_lead_time_seconds() -> u64 {
    600
}

fn default_token_refresh_jitter_factor() -> f64 {
    0.0
}
