//! The session/identity gate.
//!
//! Tracks whether the acting party is anonymous or authenticated and, by
//! extension, which cart (guest vs. user) is current. Only this gate mutates
//! the identity, and only along the legal edges:
//!
//! ```text
//! Anonymous     --(restore valid session)--> Authenticated
//! Anonymous     --(sign in success)-------->  Authenticated
//! Authenticated --(sign out)--------------->  Anonymous
//! Authenticated --(session expired/revoked)-> Anonymous
//! ```
//!
//! Auth services fire duplicate and late signed-in events; the gate absorbs
//! them so the expensive follow-up work (remote cart fetch-or-create, guest
//! merge) runs exactly once, on the Anonymous → Authenticated edge, and never
//! tramples unsynced local changes mid-session.
//!
//! At startup the persisted identity is seeded as *provisional*: it makes the
//! UI render the right chrome immediately, but it does not count as
//! authenticated for edge purposes until the session-restore check against
//! the auth service confirms it.

use std::sync::Mutex;

use tracing::{debug, info};

use luxe_core::{AuthUser, Identity};

/// Outcome of a signed-in event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInEdge {
    /// Anonymous → Authenticated: the caller must load the remote user cart
    /// (and merge the guest cart, for explicit sign-ins).
    Entered,
    /// Already authenticated: no cart work. The identity details are
    /// refreshed, nothing else happens.
    Unchanged,
}

struct GateState {
    identity: Identity,
    /// A restored-from-disk identity that the auth service has not confirmed
    /// yet. Provisional identities still fire the Entered edge on confirm.
    provisional: bool,
}

/// Tracks the current identity.
pub struct SessionGate {
    state: Mutex<GateState>,
}

impl Default for SessionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionGate {
    /// A gate starting anonymous (first load).
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                identity: Identity::Anonymous,
                provisional: false,
            }),
        }
    }

    /// The current identity.
    #[must_use]
    pub fn current(&self) -> Identity {
        self.state
            .lock()
            .map(|guard| guard.identity.clone())
            .unwrap_or_default()
    }

    /// Seed a persisted identity at startup, before anything renders.
    ///
    /// The identity is provisional until the session-restore check against
    /// the auth service confirms or revokes it.
    pub fn restore_provisional(&self, identity: Identity) {
        if let Ok(mut guard) = self.state.lock() {
            guard.provisional = identity.is_authenticated();
            guard.identity = identity;
        }
    }

    /// React to a signed-in event (explicit sign-in success, or a restored
    /// session confirmed by the auth service).
    ///
    /// Returns [`SignInEdge::Entered`] only when the previous identity was
    /// anonymous or an unconfirmed provisional. Repeated events for an
    /// already-authenticated identity are no-ops for cart loading, whatever
    /// user they carry.
    pub fn signed_in(&self, user: AuthUser) -> SignInEdge {
        let Ok(mut guard) = self.state.lock() else {
            return SignInEdge::Unchanged;
        };

        let edge = match &guard.identity {
            Identity::Anonymous => {
                info!(user_id = %user.id, "identity: anonymous -> authenticated");
                SignInEdge::Entered
            }
            Identity::Authenticated(_) if guard.provisional => {
                info!(user_id = %user.id, "identity: restored session confirmed");
                SignInEdge::Entered
            }
            Identity::Authenticated(previous) => {
                debug!(
                    previous = %previous.id,
                    current = %user.id,
                    "signed-in event while already authenticated; no cart action"
                );
                SignInEdge::Unchanged
            }
        };

        guard.identity = Identity::Authenticated(user);
        guard.provisional = false;
        edge
    }

    /// React to a signed-out event (explicit sign-out, or expiry/revocation
    /// detected by the auth collaborator).
    ///
    /// Returns whether a user was signed in (provisionally or confirmed).
    pub fn signed_out(&self) -> bool {
        let Ok(mut guard) = self.state.lock() else {
            return false;
        };

        let was_authenticated = guard.identity.is_authenticated();
        if was_authenticated {
            info!("identity: authenticated -> anonymous");
            guard.identity = Identity::Anonymous;
        }
        guard.provisional = false;
        was_authenticated
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use luxe_core::{Email, UserId, UserRole};

    use super::*;

    fn user(id: UserId) -> AuthUser {
        AuthUser {
            id,
            email: Email::parse("user@example.com").unwrap(),
            email_verified: true,
            role: UserRole::User,
            full_name: None,
            phone: None,
            last_login: None,
        }
    }

    #[test]
    fn test_starts_anonymous() {
        let gate = SessionGate::new();
        assert_eq!(gate.current(), Identity::Anonymous);
    }

    #[test]
    fn test_sign_in_from_anonymous_enters() {
        let gate = SessionGate::new();
        let id = UserId::generate();

        assert_eq!(gate.signed_in(user(id)), SignInEdge::Entered);
        assert_eq!(gate.current().user_id(), Some(id));
    }

    #[test]
    fn test_duplicate_sign_in_is_noop_edge() {
        let gate = SessionGate::new();
        let id = UserId::generate();

        assert_eq!(gate.signed_in(user(id)), SignInEdge::Entered);
        assert_eq!(gate.signed_in(user(id)), SignInEdge::Unchanged);
    }

    #[test]
    fn test_sign_in_with_different_user_while_authenticated_is_unchanged() {
        let gate = SessionGate::new();
        let first = UserId::generate();
        let second = UserId::generate();

        gate.signed_in(user(first));
        assert_eq!(gate.signed_in(user(second)), SignInEdge::Unchanged);
        // Identity details still track the latest event
        assert_eq!(gate.current().user_id(), Some(second));
    }

    #[test]
    fn test_sign_out_reverts_to_anonymous() {
        let gate = SessionGate::new();
        gate.signed_in(user(UserId::generate()));

        assert!(gate.signed_out());
        assert_eq!(gate.current(), Identity::Anonymous);
        // Second sign-out is a no-op
        assert!(!gate.signed_out());
    }

    #[test]
    fn test_provisional_restore_confirms_as_entered_once() {
        let gate = SessionGate::new();
        let id = UserId::generate();
        gate.restore_provisional(Identity::Authenticated(user(id)));

        // UI sees the restored identity immediately...
        assert_eq!(gate.current().user_id(), Some(id));
        // ...and the confirmation fires the cart-loading edge exactly once
        assert_eq!(gate.signed_in(user(id)), SignInEdge::Entered);
        assert_eq!(gate.signed_in(user(id)), SignInEdge::Unchanged);
    }

    #[test]
    fn test_revoked_provisional_signs_out() {
        let gate = SessionGate::new();
        gate.restore_provisional(Identity::Authenticated(user(UserId::generate())));

        assert!(gate.signed_out());
        assert_eq!(gate.current(), Identity::Anonymous);
    }
}
