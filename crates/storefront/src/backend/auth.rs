//! Client for the hosted authentication service.
//!
//! Sign-up, password sign-in, sign-out, password recovery and session
//! restore. The service owns session persistence: tokens are written to a
//! file in the state directory (the service's own record, separate from the
//! application's persisted `{guest cart, identity}` state) so a restarted
//! process can restore the session it held.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

use luxe_core::{AuthUser, Email, UserId};

use super::BackendError;
use super::error_from_response;
use crate::config::{ConfigError, StoreConfig};

/// File the session tokens are persisted to, inside the state directory.
const SESSION_FILE: &str = "auth-session.json";

/// Session tokens issued by the auth service.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionTokens {
    access_token: String,
    refresh_token: Option<String>,
}

/// Shared holder for the current session's tokens.
///
/// Cloned into every backend client so record and storage requests carry the
/// signed-in user's authorization as soon as it exists.
#[derive(Clone)]
pub struct TokenStore {
    inner: Arc<TokenStoreInner>,
}

struct TokenStoreInner {
    tokens: RwLock<Option<SessionTokens>>,
    path: Option<PathBuf>,
}

impl TokenStore {
    /// An in-memory store (used in tests).
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(TokenStoreInner {
                tokens: RwLock::new(None),
                path: None,
            }),
        }
    }

    /// A store that persists tokens under `state_dir`, restoring any
    /// previously saved session on construction.
    #[must_use]
    pub fn persisted_in(state_dir: &Path) -> Self {
        let path = state_dir.join(SESSION_FILE);
        let tokens = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok());

        Self {
            inner: Arc::new(TokenStoreInner {
                tokens: RwLock::new(tokens),
                path: Some(path),
            }),
        }
    }

    /// The current access token, if a session is held.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.inner
            .tokens
            .read()
            .ok()
            .and_then(|guard| guard.as_ref().map(|t| t.access_token.clone()))
    }

    fn set(&self, tokens: SessionTokens) {
        if let Ok(mut guard) = self.inner.tokens.write() {
            *guard = Some(tokens.clone());
        }
        if let Some(path) = &self.inner.path {
            if let Some(dir) = path.parent() {
                let _ = std::fs::create_dir_all(dir);
            }
            match serde_json::to_string(&tokens) {
                Ok(raw) => {
                    if let Err(e) = std::fs::write(path, raw) {
                        warn!(error = %e, "failed to persist session tokens");
                    }
                }
                Err(e) => warn!(error = %e, "failed to serialize session tokens"),
            }
        }
    }

    fn clear(&self) {
        if let Ok(mut guard) = self.inner.tokens.write() {
            *guard = None;
        }
        if let Some(path) = &self.inner.path
            && path.exists()
            && let Err(e) = std::fs::remove_file(path)
        {
            warn!(error = %e, "failed to remove persisted session tokens");
        }
    }
}

// =============================================================================
// Wire types
// =============================================================================

/// The auth service's user representation.
#[derive(Debug, Deserialize)]
struct RemoteUser {
    id: UserId,
    email: String,
    #[serde(default)]
    email_confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    user_metadata: serde_json::Value,
}

impl RemoteUser {
    fn into_auth_user(self) -> Result<AuthUser, BackendError> {
        let email = Email::parse(&self.email).map_err(|e| BackendError::Api {
            status: 0,
            code: None,
            message: format!("auth service returned an invalid email: {e}"),
        })?;
        let metadata_str = |key: &str| {
            self.user_metadata
                .get(key)
                .and_then(|v| v.as_str())
                .map(ToString::to_string)
        };

        Ok(AuthUser {
            id: self.id,
            email,
            email_verified: self.email_confirmed_at.is_some(),
            role: luxe_core::UserRole::default(),
            full_name: metadata_str("full_name"),
            phone: metadata_str("phone"),
            last_login: None,
        })
    }
}

/// Response to a password-grant token request.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    user: RemoteUser,
}

// =============================================================================
// AuthClient
// =============================================================================

/// Client for the hosted auth service.
#[derive(Clone)]
pub struct AuthClient {
    inner: Arc<AuthClientInner>,
}

struct AuthClientInner {
    client: reqwest::Client,
    base: Url,
    anon_key: String,
    tokens: TokenStore,
}

impl AuthClient {
    /// Create a new auth client.
    ///
    /// # Errors
    ///
    /// Returns an error if the auth path cannot be joined onto the backend URL.
    pub fn new(config: &StoreConfig, tokens: TokenStore) -> Result<Self, ConfigError> {
        let base = config.backend_url.join("auth/v1/").map_err(|e| {
            ConfigError::InvalidEnvVar("LUXE_BACKEND_URL".to_string(), e.to_string())
        })?;

        Ok(Self {
            inner: Arc::new(AuthClientInner {
                client: reqwest::Client::new(),
                base,
                anon_key: config.anon_key.expose_secret().to_string(),
                tokens,
            }),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.inner.base.join(path).map_err(|_| BackendError::Api {
            status: 0,
            code: None,
            message: format!("invalid auth endpoint: {path}"),
        })
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.header("apikey", &self.inner.anon_key)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let bearer = self
            .inner
            .tokens
            .access_token()
            .unwrap_or_else(|| self.inner.anon_key.clone());
        self.request(builder).bearer_auth(bearer)
    }

    /// Register a new account.
    ///
    /// The display name travels as user metadata. When the project
    /// auto-confirms emails the response carries a session, which is adopted
    /// immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the auth service rejects the registration.
    #[instrument(skip(self, password, full_name))]
    pub async fn sign_up(
        &self,
        email: &Email,
        password: &str,
        full_name: &str,
    ) -> Result<AuthUser, BackendError> {
        let url = self.endpoint("signup")?;
        let body = serde_json::json!({
            "email": email.as_str(),
            "password": password,
            "data": { "full_name": full_name },
        });

        let response = self
            .request(self.inner.client.post(url).json(&body))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        // Auto-confirmed projects answer with a session; others with the bare user
        let payload: serde_json::Value = response.json().await?;
        if payload.get("access_token").is_some() {
            let session: TokenResponse = serde_json::from_value(payload)?;
            self.inner.tokens.set(SessionTokens {
                access_token: session.access_token,
                refresh_token: session.refresh_token,
            });
            session.user.into_auth_user()
        } else {
            let user: RemoteUser = serde_json::from_value(payload)?;
            user.into_auth_user()
        }
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials are rejected or the request fails.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &Email, password: &str) -> Result<AuthUser, BackendError> {
        let url = self.endpoint("token?grant_type=password")?;
        let body = serde_json::json!({
            "email": email.as_str(),
            "password": password,
        });

        let response = self
            .request(self.inner.client.post(url).json(&body))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let session: TokenResponse = response.json().await?;
        self.inner.tokens.set(SessionTokens {
            access_token: session.access_token,
            refresh_token: session.refresh_token,
        });
        session.user.into_auth_user()
    }

    /// Sign out, revoking the session server-side and dropping local tokens.
    ///
    /// Local tokens are dropped even when the remote revocation fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the revocation request fails.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<(), BackendError> {
        let had_session = self.inner.tokens.access_token().is_some();
        if !had_session {
            return Ok(());
        }

        let url = self.endpoint("logout")?;
        let result = async {
            let response = self
                .authorized(self.inner.client.post(url))
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(error_from_response(response).await);
            }
            Ok(())
        }
        .await;

        self.inner.tokens.clear();
        result
    }

    /// Request a password-reset email.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn request_password_reset(&self, email: &Email) -> Result<(), BackendError> {
        let url = self.endpoint("recover")?;
        let body = serde_json::json!({ "email": email.as_str() });

        let response = self
            .request(self.inner.client.post(url).json(&body))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }

    /// Set a new password for the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns an error if no session is held or the request fails.
    #[instrument(skip(self, new_password))]
    pub async fn update_password(&self, new_password: &str) -> Result<(), BackendError> {
        let url = self.endpoint("user")?;
        let body = serde_json::json!({ "password": new_password });

        let response = self
            .authorized(self.inner.client.put(url).json(&body))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }

    /// Check whether the held session is still valid and return its user.
    ///
    /// Returns `None` (and drops the tokens) when no session is held or the
    /// service no longer recognizes it - the expired/revoked transition is
    /// detected here, by the collaborator, not locally.
    ///
    /// # Errors
    ///
    /// Returns an error only for transport failures; a rejected token is
    /// `Ok(None)`.
    #[instrument(skip(self))]
    pub async fn current_session(&self) -> Result<Option<AuthUser>, BackendError> {
        if self.inner.tokens.access_token().is_none() {
            return Ok(None);
        }

        let url = self.endpoint("user")?;
        let response = self
            .authorized(self.inner.client.get(url))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            || response.status() == reqwest::StatusCode::FORBIDDEN
        {
            debug!("stored session no longer valid");
            self.inner.tokens.clear();
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let user: RemoteUser = response.json().await?;
        user.into_auth_user().map(Some)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_token_store_in_memory() {
        let store = TokenStore::in_memory();
        assert!(store.access_token().is_none());

        store.set(SessionTokens {
            access_token: "abc".to_string(),
            refresh_token: None,
        });
        assert_eq!(store.access_token().as_deref(), Some("abc"));

        store.clear();
        assert!(store.access_token().is_none());
    }

    #[test]
    fn test_token_store_survives_restart() {
        let dir = tempfile::tempdir().unwrap();

        let store = TokenStore::persisted_in(dir.path());
        store.set(SessionTokens {
            access_token: "abc".to_string(),
            refresh_token: Some("def".to_string()),
        });

        let restored = TokenStore::persisted_in(dir.path());
        assert_eq!(restored.access_token().as_deref(), Some("abc"));

        restored.clear();
        let after_clear = TokenStore::persisted_in(dir.path());
        assert!(after_clear.access_token().is_none());
    }

    #[test]
    fn test_remote_user_mapping() {
        let remote: RemoteUser = serde_json::from_value(serde_json::json!({
            "id": uuid::Uuid::new_v4().to_string(),
            "email": "user@example.com",
            "email_confirmed_at": "2026-01-01T00:00:00Z",
            "user_metadata": { "full_name": "Test User" },
        }))
        .unwrap();

        let user = remote.into_auth_user().unwrap();
        assert!(user.email_verified);
        assert_eq!(user.full_name.as_deref(), Some("Test User"));
        assert_eq!(user.email.as_str(), "user@example.com");
    }

    #[test]
    fn test_remote_user_rejects_invalid_email() {
        let remote: RemoteUser = serde_json::from_value(serde_json::json!({
            "id": uuid::Uuid::new_v4().to_string(),
            "email": "not-an-email",
            "user_metadata": {},
        }))
        .unwrap();

        assert!(remote.into_auth_user().is_err());
    }
}
