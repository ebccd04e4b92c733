//! Identity of the acting party.
//!
//! Either anonymous (guest) or authenticated. The identity is mutated only by
//! the session gate in response to auth events; everything else treats it as
//! read-only routing information (which cart is "current", whether remote
//! sync applies).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::email::Email;
use super::id::UserId;

/// Role attached to an authenticated user's profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    User,
    Admin,
}

/// An authenticated user, as reported by the hosted auth service plus the
/// `user_profiles` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    /// Unique user ID.
    pub id: UserId,
    /// The user's email address.
    pub email: Email,
    /// Whether the email has been verified.
    #[serde(default)]
    pub email_verified: bool,
    /// Profile role.
    #[serde(default)]
    pub role: UserRole,
    /// Display name from the profile, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    /// Contact phone from the profile, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Last successful sign-in, if recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
}

impl AuthUser {
    /// Whether this user may use the admin back office.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// The acting party: anonymous visitor or authenticated user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Identity {
    /// No signed-in user; the guest cart is current.
    #[default]
    Anonymous,
    /// A signed-in user; the user cart is current.
    Authenticated(AuthUser),
}

impl Identity {
    /// The signed-in user, if any.
    #[must_use]
    pub const fn user(&self) -> Option<&AuthUser> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(user) => Some(user),
        }
    }

    /// The signed-in user's ID, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.user().map(|u| u.id)
    }

    /// Whether a user is signed in.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn user() -> AuthUser {
        AuthUser {
            id: UserId::generate(),
            email: Email::parse("user@example.com").unwrap(),
            email_verified: true,
            role: UserRole::User,
            full_name: Some("Test User".to_string()),
            phone: None,
            last_login: None,
        }
    }

    #[test]
    fn test_anonymous_has_no_user() {
        assert!(Identity::Anonymous.user().is_none());
        assert!(!Identity::Anonymous.is_authenticated());
    }

    #[test]
    fn test_authenticated_exposes_user() {
        let u = user();
        let identity = Identity::Authenticated(u.clone());
        assert_eq!(identity.user_id(), Some(u.id));
        assert!(identity.is_authenticated());
    }

    #[test]
    fn test_role_gate() {
        let mut u = user();
        assert!(!u.is_admin());
        u.role = UserRole::Admin;
        assert!(u.is_admin());
    }

    #[test]
    fn test_serde_roundtrip() {
        let identity = Identity::Authenticated(user());
        let json = serde_json::to_string(&identity).unwrap();
        let back: Identity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, identity);

        let anon: Identity = serde_json::from_str("{\"state\":\"anonymous\"}").unwrap();
        assert_eq!(anon, Identity::Anonymous);
    }
}
