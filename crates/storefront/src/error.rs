//! Unified application error type.
//!
//! Subsystem errors convert in via `#[from]`; callers that surface errors to
//! the UI use [`AppError::is_retryable`] to decide between a retry affordance
//! (read paths) and a plain message (validation). Cart-sync upsert failures
//! never reach this type at all - they are logged inside the synchronization
//! engine and local state is kept.

use thiserror::Error;

use crate::backend::BackendError;
use crate::config::ConfigError;
use crate::persist::PersistError;
use crate::services::auth::AuthError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Hosted backend operation failed.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Local persistence failed.
    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    /// Input rejected before any remote call.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation requires a signed-in (or admin) user.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl AppError {
    /// Whether the UI should offer a retry for this failure.
    ///
    /// Transport and server-side backend failures on read paths are
    /// retryable; validation and authorization problems are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Backend(e) => e.is_retryable(),
            Self::Auth(e) => e.is_retryable(),
            Self::Config(_)
            | Self::Persist(_)
            | Self::Validation(_)
            | Self::Unauthorized(_)
            | Self::NotFound(_) => false,
        }
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("product 123".to_string());
        assert_eq!(err.to_string(), "Not found: product 123");

        let err = AppError::Validation("address is required".to_string());
        assert_eq!(err.to_string(), "Validation error: address is required");
    }

    #[test]
    fn test_retryability() {
        let transport = AppError::Backend(BackendError::Api {
            status: 502,
            code: None,
            message: "bad gateway".to_string(),
        });
        assert!(transport.is_retryable());

        assert!(!AppError::Validation("nope".to_string()).is_retryable());
        assert!(!AppError::Unauthorized("nope".to_string()).is_retryable());
        assert!(!AppError::Backend(BackendError::NotFound).is_retryable());
    }
}
