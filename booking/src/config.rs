//! Configuration management for the booking client.
//!
//! Loads configuration from environment variables (after reading an optional
//! `.env` file) with sensible defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Configuration problems detected by [`Config::validate`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `MARQUEE_API_URL` is not an absolute http(s) URL
    #[error("invalid backend URL {url:?}: {reason}")]
    InvalidApiUrl {
        /// The configured value
        url: String,
        /// Parser message
        reason: String,
    },

    /// No user to book as
    #[error("MARQUEE_USER_ID is not set")]
    MissingUserId,

    /// Zero timeout would fail every request
    #[error("MARQUEE_HTTP_TIMEOUT_SECS must be greater than zero")]
    ZeroTimeout,

    /// The HTTP client could not be built
    #[error("could not build HTTP client: {0}")]
    HttpClient(String),
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Backend API configuration
    pub api: ApiConfig,
    /// Who is booking, and where
    pub session: SessionConfig,
    /// Pricing configuration
    pub pricing: PricingConfig,
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
}

/// Backend API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the REST backend
    pub url: String,
    /// Bearer token sent with every request
    pub token: Option<String>,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl ApiConfig {
    /// Per-request timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Identity and locale of the booking user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Backend user id
    pub user_id: Option<String>,
    /// City used to look up theaters and showtimes
    pub city: String,
}

/// Pricing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Flat fee charged when moving an existing ticket
    pub update_fee: u64,
    /// Currency code handed to the payment provider
    pub currency: String,
}

impl Config {
    /// Load configuration from the environment, reading `.env` first if present.
    ///
    /// Unset or unparsable values fall back to defaults; call
    /// [`Config::validate`] before using the result.
    #[must_use]
    pub fn from_env() -> Self {
        // A missing .env file is the normal case.
        let _ = dotenvy::dotenv();

        Self {
            api: ApiConfig {
                url: env::var("MARQUEE_API_URL")
                    .unwrap_or_else(|_| "http://localhost:8080/".to_string()),
                token: env::var("MARQUEE_API_TOKEN").ok().filter(|t| !t.is_empty()),
                timeout_secs: env::var("MARQUEE_HTTP_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(15),
            },
            session: SessionConfig {
                user_id: env::var("MARQUEE_USER_ID").ok().filter(|u| !u.is_empty()),
                city: env::var("MARQUEE_CITY").unwrap_or_else(|_| "Pune".to_string()),
            },
            pricing: PricingConfig {
                update_fee: env::var("MARQUEE_UPDATE_FEE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(20),
                currency: env::var("MARQUEE_CURRENCY").unwrap_or_else(|_| "INR".to_string()),
            },
            log_level: env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,marquee_booking=debug".to_string()),
        }
    }

    /// Check that the configuration can drive a booking session
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = reqwest::Url::parse(&self.api.url).map_err(|e| ConfigError::InvalidApiUrl {
            url: self.api.url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidApiUrl {
                url: self.api.url.clone(),
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }
        if self.session.user_id.is_none() {
            return Err(ConfigError::MissingUserId);
        }
        if self.api.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                url: "http://localhost:8080/".to_string(),
                token: None,
                timeout_secs: 15,
            },
            session: SessionConfig {
                user_id: None,
                city: "Pune".to_string(),
            },
            pricing: PricingConfig {
                update_fee: 20,
                currency: "INR".to_string(),
            },
            log_level: "info,marquee_booking=debug".to_string(),
        }
    }
}
