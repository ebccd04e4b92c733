//! Clients for the hosted backend platform.
//!
//! # Architecture
//!
//! Everything below is a request/response contract over the hosted project's
//! HTTP surface - the backend is the source of truth, there is NO local
//! database:
//!
//! - [`RestClient`] - record CRUD and filtered queries against named
//!   collections (`products`, `orders`, `user_profiles`, `user_cart`,
//!   `shipping_addresses`)
//! - [`AuthClient`] - the hosted auth service (sign-up, sign-in, sign-out,
//!   password recovery, session restore)
//! - [`StorageClient`] - object storage for product images
//! - [`OrderFeed`] - change notification for new orders
//!
//! All clients are cheaply cloneable (`Arc` inner) and share the session
//! token state, so record requests run under the signed-in user's
//! row-level-security context as soon as authentication succeeds.

mod auth;
mod realtime;
mod rest;
mod storage;

pub use auth::{AuthClient, TokenStore};
pub use realtime::OrderFeed;
pub use rest::{Query, RestClient, SortDirection};
pub use storage::StorageClient;

use thiserror::Error;

use crate::config::{ConfigError, StoreConfig};

/// Errors that can occur when talking to the hosted backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP transport failed (DNS, TLS, timeout, connection reset).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend rejected the request.
    #[error("API error (status {status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Backend error code, when one was provided (e.g. `PGRST116`).
        code: Option<String>,
        /// Human-readable message from the backend.
        message: String,
    },

    /// A single-row read matched no record.
    ///
    /// This is the normal first-time case for `user_cart` reads and is never
    /// treated as a failure by callers that create-on-missing.
    #[error("record not found")]
    NotFound,

    /// Response body did not parse.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl BackendError {
    /// Whether this error is the distinguished not-found condition.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Whether a retry could plausibly succeed (transport failures and
    /// server-side errors; not client-side rejections).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::NotFound | Self::Parse(_) => false,
        }
    }
}

/// Error payload shape the backend returns for failed record requests.
#[derive(Debug, serde::Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
    // Auth endpoints use different field names for the same thing
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

impl ApiErrorBody {
    fn into_error(self, status: u16) -> BackendError {
        let message = self
            .message
            .or(self.msg)
            .or(self.error_description)
            .unwrap_or_else(|| "(no error details provided)".to_string());
        BackendError::Api {
            status,
            code: self.code,
            message,
        }
    }
}

/// Turn a non-success response into a [`BackendError`].
///
/// The body is read as text first so malformed error payloads still produce
/// a useful message.
pub(crate) async fn error_from_response(response: reqwest::Response) -> BackendError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();

    serde_json::from_str::<ApiErrorBody>(&body).map_or_else(
        |_| BackendError::Api {
            status,
            code: None,
            message: body.chars().take(200).collect(),
        },
        |parsed| parsed.into_error(status),
    )
}

/// The full set of hosted-backend clients, wired to one configuration.
#[derive(Clone)]
pub struct Backend {
    rest: RestClient,
    auth: AuthClient,
    storage: StorageClient,
}

impl Backend {
    /// Build all clients from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend URL cannot host the API paths.
    pub fn new(config: &StoreConfig) -> Result<Self, ConfigError> {
        let tokens = TokenStore::persisted_in(&config.state_dir);
        let rest = RestClient::new(config, tokens.clone())?;
        let auth = AuthClient::new(config, tokens.clone())?;
        let storage = StorageClient::new(config, tokens)?;

        Ok(Self {
            rest,
            auth,
            storage,
        })
    }

    /// The record CRUD client.
    #[must_use]
    pub const fn rest(&self) -> &RestClient {
        &self.rest
    }

    /// The hosted auth client.
    #[must_use]
    pub const fn auth(&self) -> &AuthClient {
        &self.auth
    }

    /// The object storage client.
    #[must_use]
    pub const fn storage(&self) -> &StorageClient {
        &self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::Api {
            status: 400,
            code: Some("22P02".to_string()),
            message: "invalid input syntax".to_string(),
        };
        assert_eq!(err.to_string(), "API error (status 400): invalid input syntax");
    }

    #[test]
    fn test_not_found_is_not_retryable() {
        assert!(!BackendError::NotFound.is_retryable());
        assert!(BackendError::NotFound.is_not_found());
    }

    #[test]
    fn test_server_errors_are_retryable() {
        let err = BackendError::Api {
            status: 503,
            code: None,
            message: "unavailable".to_string(),
        };
        assert!(err.is_retryable());

        let err = BackendError::Api {
            status: 400,
            code: None,
            message: "bad request".to_string(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_api_error_body_field_fallbacks() {
        let body: ApiErrorBody =
            serde_json::from_str(r#"{"msg":"invalid credentials"}"#).expect("parse");
        let err = body.into_error(400);
        assert_eq!(
            err.to_string(),
            "API error (status 400): invalid credentials"
        );
    }
}
