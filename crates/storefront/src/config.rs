//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `LUXE_BACKEND_URL` - Base URL of the hosted backend project
//! - `LUXE_ANON_KEY` - Public (anon) API key for the hosted backend
//!
//! ## Optional
//! - `LUXE_STATE_DIR` - Directory for locally persisted state (default: `.luxe`)
//! - `LUXE_ORDER_POLL_SECS` - Poll interval for the order feed (default: 5)
//!
//! Configuration fails fast: a missing required variable aborts startup
//! before any client is constructed.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Base URL of the hosted backend (REST, auth and storage endpoints hang
    /// off this).
    pub backend_url: Url,
    /// Public API key sent with every backend request.
    pub anon_key: SecretString,
    /// Directory holding the locally persisted `{guest cart, identity}` record.
    pub state_dir: PathBuf,
    /// How often the order feed polls for new orders.
    pub order_poll_interval: Duration,
}

impl StoreConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let backend_url = get_required_env("LUXE_BACKEND_URL")?
            .parse::<Url>()
            .map_err(|e| ConfigError::InvalidEnvVar("LUXE_BACKEND_URL".to_string(), e.to_string()))?;
        let anon_key = SecretString::from(get_required_env("LUXE_ANON_KEY")?);
        let state_dir = PathBuf::from(get_env_or_default("LUXE_STATE_DIR", ".luxe"));
        let poll_secs = get_env_or_default("LUXE_ORDER_POLL_SECS", "5")
            .parse::<u64>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("LUXE_ORDER_POLL_SECS".to_string(), e.to_string())
            })?;

        Ok(Self {
            backend_url,
            anon_key,
            state_dir,
            order_poll_interval: Duration::from_secs(poll_secs),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_required_env_missing() {
        let result = get_required_env("LUXE_TEST_VAR_THAT_DOES_NOT_EXIST");
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(_))));
    }

    #[test]
    fn test_env_or_default_falls_back() {
        let value = get_env_or_default("LUXE_TEST_OTHER_MISSING_VAR", "fallback");
        assert_eq!(value, "fallback");
    }
}
