//! Password policy validation.
//!
//! The policy is enforced before any remote auth call is made: at least 8
//! characters, with one lowercase letter, one uppercase letter, one digit and
//! one special character from the allowed set. Characters outside the allowed
//! classes are rejected.

use thiserror::Error;

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Special characters the policy accepts.
pub const SPECIAL_CHARS: &str = "@$!%*?&";

/// Errors produced by [`validate_password`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PasswordError {
    /// Shorter than [`MIN_PASSWORD_LENGTH`].
    #[error("password must be at least {MIN_PASSWORD_LENGTH} characters long")]
    TooShort,
    /// No lowercase letter present.
    #[error("password must contain at least one lowercase letter")]
    MissingLowercase,
    /// No uppercase letter present.
    #[error("password must contain at least one uppercase letter")]
    MissingUppercase,
    /// No digit present.
    #[error("password must contain at least one number")]
    MissingDigit,
    /// No special character from the allowed set present.
    #[error("password must contain at least one special character ({SPECIAL_CHARS})")]
    MissingSpecial,
    /// A character outside the allowed classes.
    #[error("password may only contain letters, numbers and {SPECIAL_CHARS}")]
    InvalidCharacter,
}

/// Validate a password against the storefront policy.
///
/// # Errors
///
/// Returns the first policy violation found, in the order: length, charset,
/// lowercase, uppercase, digit, special.
pub fn validate_password(password: &str) -> Result<(), PasswordError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(PasswordError::TooShort);
    }

    if !password
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || SPECIAL_CHARS.contains(c))
    {
        return Err(PasswordError::InvalidCharacter);
    }

    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(PasswordError::MissingLowercase);
    }

    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(PasswordError::MissingUppercase);
    }

    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(PasswordError::MissingDigit);
    }

    if !password.chars().any(|c| SPECIAL_CHARS.contains(c)) {
        return Err(PasswordError::MissingSpecial);
    }

    Ok(())
}
