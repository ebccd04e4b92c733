//! Local durable storage for the guest cart and identity.
//!
//! A single namespaced JSON record, written on every state change and read
//! once at startup before anything renders. The authenticated user's cart is
//! deliberately excluded: it is always sourced fresh from the remote store,
//! so two accounts sharing a device can never see each other's lines.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use luxe_core::{Cart, Identity};

/// Namespace the record is stored under.
pub const NAMESPACE: &str = "luxe-store";

/// Errors from the persistence facade.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored record did not serialize/deserialize.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// The persisted record: guest cart plus identity, nothing else.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    /// The guest cart. Owned exclusively by this device; never sent to the
    /// remote store.
    #[serde(rename = "guestCart", default)]
    pub guest_cart: Cart,
    /// The last known identity, provisional on restore until the auth
    /// service confirms it.
    #[serde(default)]
    pub identity: Identity,
}

/// File-backed store for [`PersistedState`].
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    /// A store writing `<state_dir>/luxe-store.json`.
    #[must_use]
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(format!("{NAMESPACE}.json")),
        }
    }

    /// Load the persisted record.
    ///
    /// A missing file is the normal first-run case and yields the default
    /// (empty guest cart, anonymous).
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<PersistedState, PersistError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no persisted state; starting fresh");
                Ok(PersistedState::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write the record durably.
    ///
    /// The write goes to a temporary file first and is renamed into place, so
    /// a crash mid-write never corrupts the record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized or written.
    pub fn save(&self, state: &PersistedState) -> Result<(), PersistError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }

        let raw = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&raw)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use luxe_core::{AuthUser, CartLine, Email, Product, ProductId, UserId, UserRole};

    use super::*;

    fn guest_cart() -> Cart {
        let product = Product {
            id: ProductId::generate(),
            name: "Linen Shirt".to_string(),
            description: String::new(),
            price: Decimal::new(2000, 2),
            category: "men".to_string(),
            images: vec![],
            sizes: vec!["M".to_string()],
            colors: vec!["Black".to_string()],
            stock: 10,
            created_at: Utc::now(),
        };
        let mut cart = Cart::new();
        cart.add_line(CartLine::new(
            product,
            2,
            Some("M".to_string()),
            Some("Black".to_string()),
        ));
        cart
    }

    #[test]
    fn test_missing_file_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());

        let state = store.load().unwrap();
        assert_eq!(state, PersistedState::default());
        assert!(state.guest_cart.is_empty());
        assert_eq!(state.identity, Identity::Anonymous);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());

        let state = PersistedState {
            guest_cart: guest_cart(),
            identity: Identity::Authenticated(AuthUser {
                id: UserId::generate(),
                email: Email::parse("user@example.com").unwrap(),
                email_verified: false,
                role: UserRole::User,
                full_name: None,
                phone: None,
                last_login: None,
            }),
        };
        store.save(&state).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_save_overwrites_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());

        store
            .save(&PersistedState {
                guest_cart: guest_cart(),
                identity: Identity::Anonymous,
            })
            .unwrap();
        store.save(&PersistedState::default()).unwrap();

        let loaded = store.load().unwrap();
        assert!(loaded.guest_cart.is_empty());
    }

    #[test]
    fn test_corrupt_record_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        std::fs::write(dir.path().join("luxe-store.json"), "{not json").unwrap();

        assert!(matches!(store.load(), Err(PersistError::Serde(_))));
    }

    #[test]
    fn test_wire_shape_uses_guest_cart_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        store.save(&PersistedState::default()).unwrap();

        let raw = std::fs::read_to_string(dir.path().join("luxe-store.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(value.get("guestCart").is_some());
        assert!(value.get("identity").is_some());
    }
}
