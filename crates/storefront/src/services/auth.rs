//! Authentication flows.
//!
//! Validation (email shape, password policy) runs before any remote call;
//! only clean input reaches the hosted auth service. Sign-up additionally
//! creates the `user_profiles` record, and sign-in stamps `last_login` and
//! enriches the identity with profile fields (role, display name).

use chrono::Utc;
use thiserror::Error;
use tracing::{instrument, warn};

use luxe_core::{AuthUser, Email, EmailError, PasswordError, UserId, validate_password};

use crate::backend::{AuthClient, BackendError, Query, RestClient};
use crate::services::profile::UserProfile;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// Password failed the policy check.
    #[error("password validation failed: {0}")]
    WeakPassword(#[from] PasswordError),

    /// Wrong email/password combination.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// An account with this email already exists.
    #[error("an account with this email already exists")]
    UserAlreadyExists,

    /// Current password did not verify during a password change.
    #[error("current password is incorrect")]
    CurrentPasswordIncorrect,

    /// Operation requires a signed-in user.
    #[error("not signed in")]
    NotSignedIn,

    /// Hosted backend failure.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

impl AuthError {
    /// Whether a retry could plausibly succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Backend(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Map an auth-service rejection of a token request to credentials failure.
fn map_credentials_error(e: BackendError) -> AuthError {
    match e {
        BackendError::Api { status: 400 | 401, .. } => AuthError::InvalidCredentials,
        other => AuthError::Backend(other),
    }
}

/// Map an auth-service rejection of a sign-up.
fn map_signup_error(e: BackendError) -> AuthError {
    match e {
        BackendError::Api {
            status: 400 | 422,
            ref message,
            ..
        } if message.to_lowercase().contains("already") => AuthError::UserAlreadyExists,
        other => AuthError::Backend(other),
    }
}

/// Row written to `user_profiles` at sign-up.
#[derive(Debug, serde::Serialize)]
struct NewProfile<'a> {
    id: UserId,
    full_name: &'a str,
    email_verified: bool,
}

/// Fill in profile-owned identity fields (role, name, phone, last login).
///
/// A missing or unreadable profile downgrades to the auth-service view of
/// the user rather than failing the sign-in.
pub(crate) async fn enrich_with_profile(rest: &RestClient, mut user: AuthUser) -> AuthUser {
    let query = Query::new().eq("id", user.id);
    match rest.select_single::<UserProfile>("user_profiles", &query).await {
        Ok(profile) => {
            user.role = profile.role;
            user.full_name = profile.full_name.or(user.full_name);
            user.phone = profile.phone.or(user.phone);
            user.last_login = profile.last_login;
        }
        Err(e) => {
            warn!(error = %e, user_id = %user.id, "failed to load user profile");
        }
    }
    user
}

/// Authentication service.
pub struct AuthService<'a> {
    auth: &'a AuthClient,
    rest: &'a RestClient,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(auth: &'a AuthClient, rest: &'a RestClient) -> Self {
        Self { auth, rest }
    }

    /// Register a new account and create its profile record.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail`/`WeakPassword` before any remote
    /// call, `UserAlreadyExists` when the email is taken, and `Backend` for
    /// other failures (including the profile insert).
    #[instrument(skip(self, password, full_name))]
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<AuthUser, AuthError> {
        let email = Email::parse(email)?;
        validate_password(password)?;

        let user = self
            .auth
            .sign_up(&email, password, full_name)
            .await
            .map_err(map_signup_error)?;

        self.rest
            .insert(
                "user_profiles",
                &NewProfile {
                    id: user.id,
                    full_name,
                    email_verified: false,
                },
            )
            .await?;

        Ok(user)
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let email = Email::parse(email)?;

        let user = self
            .auth
            .sign_in(&email, password)
            .await
            .map_err(map_credentials_error)?;

        // Stamp last_login; a failure here must not block the sign-in
        let stamp = serde_json::json!({ "last_login": Utc::now() });
        if let Err(e) = self
            .rest
            .update("user_profiles", &Query::new().eq("id", user.id), &stamp)
            .await
        {
            warn!(error = %e, user_id = %user.id, "failed to update last_login");
        }

        Ok(enrich_with_profile(self.rest, user).await)
    }

    /// Sign out of the hosted auth service.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote revocation fails (local tokens are
    /// dropped regardless).
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        Ok(self.auth.sign_out().await?)
    }

    /// Request a password-reset email.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` before any remote call.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let email = Email::parse(email)?;
        Ok(self.auth.request_password_reset(&email).await?)
    }

    /// Set a new password from a recovery session.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::WeakPassword` before any remote call.
    pub async fn reset_password(&self, new_password: &str) -> Result<(), AuthError> {
        validate_password(new_password)?;
        Ok(self.auth.update_password(new_password).await?)
    }

    /// Change the signed-in user's password.
    ///
    /// The current password is verified by re-authenticating before the new
    /// one is set.
    ///
    /// # Errors
    ///
    /// Returns `WeakPassword` for a bad new password, `NotSignedIn` without a
    /// session, and `CurrentPasswordIncorrect` when verification fails.
    #[instrument(skip(self, current_password, new_password))]
    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        validate_password(new_password)?;

        let user = self
            .auth
            .current_session()
            .await?
            .ok_or(AuthError::NotSignedIn)?;

        self.auth
            .sign_in(&user.email, current_password)
            .await
            .map_err(|e| match map_credentials_error(e) {
                AuthError::InvalidCredentials => AuthError::CurrentPasswordIncorrect,
                other => other,
            })?;

        Ok(self.auth.update_password(new_password).await?)
    }

    /// Update profile fields (display name, phone).
    ///
    /// Unset fields are left untouched; with nothing to change this is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns `Backend` if the update is rejected.
    pub async fn update_profile(
        &self,
        user_id: UserId,
        full_name: Option<&str>,
        phone: Option<&str>,
    ) -> Result<(), AuthError> {
        let mut patch = serde_json::Map::new();
        if let Some(full_name) = full_name {
            patch.insert("full_name".to_string(), full_name.into());
        }
        if let Some(phone) = phone {
            patch.insert("phone".to_string(), phone.into());
        }
        if patch.is_empty() {
            return Ok(());
        }

        Ok(self
            .rest
            .update(
                "user_profiles",
                &Query::new().eq("id", user_id),
                &serde_json::Value::Object(patch),
            )
            .await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;
    use url::Url;

    use crate::backend::TokenStore;
    use crate::config::StoreConfig;

    use super::*;

    fn config() -> StoreConfig {
        StoreConfig {
            backend_url: Url::parse("http://localhost:54321").unwrap(),
            anon_key: SecretString::from("anon-key"),
            state_dir: std::path::PathBuf::from(".luxe"),
            order_poll_interval: std::time::Duration::from_secs(5),
        }
    }

    fn clients() -> (AuthClient, RestClient) {
        let config = config();
        let tokens = TokenStore::in_memory();
        (
            AuthClient::new(&config, tokens.clone()).unwrap(),
            RestClient::new(&config, tokens).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_sign_up_rejects_bad_email_before_any_remote_call() {
        let (auth, rest) = clients();
        let service = AuthService::new(&auth, &rest);

        let result = service.sign_up("not-an-email", "Str0ng&Pass", "Test").await;
        assert!(matches!(result, Err(AuthError::InvalidEmail(_))));
    }

    #[tokio::test]
    async fn test_sign_up_rejects_weak_password_before_any_remote_call() {
        let (auth, rest) = clients();
        let service = AuthService::new(&auth, &rest);

        let result = service.sign_up("user@example.com", "weak", "Test").await;
        assert!(matches!(result, Err(AuthError::WeakPassword(_))));
    }

    #[tokio::test]
    async fn test_reset_password_rejects_weak_password() {
        let (auth, rest) = clients();
        let service = AuthService::new(&auth, &rest);

        let result = service.reset_password("alllowercase1").await;
        assert!(matches!(result, Err(AuthError::WeakPassword(_))));
    }

    #[tokio::test]
    async fn test_change_password_requires_session() {
        let (auth, rest) = clients();
        let service = AuthService::new(&auth, &rest);

        // Valid new password, but no session held: fails before any network
        let result = service.change_password("Old1@pass", "New1@pass").await;
        assert!(matches!(result, Err(AuthError::NotSignedIn)));
    }

    #[tokio::test]
    async fn test_update_profile_with_nothing_to_change_is_noop() {
        let (auth, rest) = clients();
        let service = AuthService::new(&auth, &rest);

        let result = service.update_profile(UserId::generate(), None, None).await;
        assert!(result.is_ok());
    }

    #[test]
    fn test_credentials_error_mapping() {
        let rejected = BackendError::Api {
            status: 400,
            code: None,
            message: "invalid_grant".to_string(),
        };
        assert!(matches!(
            map_credentials_error(rejected),
            AuthError::InvalidCredentials
        ));

        let outage = BackendError::Api {
            status: 503,
            code: None,
            message: "unavailable".to_string(),
        };
        assert!(matches!(
            map_credentials_error(outage),
            AuthError::Backend(_)
        ));
    }

    #[test]
    fn test_signup_error_mapping() {
        let taken = BackendError::Api {
            status: 422,
            code: None,
            message: "User already registered".to_string(),
        };
        assert!(matches!(
            map_signup_error(taken),
            AuthError::UserAlreadyExists
        ));
    }
}
