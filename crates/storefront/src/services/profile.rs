//! User profile and saved shipping addresses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use luxe_core::{AddressId, ShippingAddress, UserId, UserRole};

use crate::backend::{BackendError, Query, RestClient, SortDirection};
use crate::error::{AppError, Result};

/// The `user_profiles` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
}

/// A saved address, before the backend assigns its ID.
#[derive(Debug, Clone, Serialize)]
pub struct NewAddress {
    pub user_id: UserId,
    pub full_name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub phone: String,
    pub is_default: bool,
}

impl NewAddress {
    fn validate(&self) -> Result<()> {
        let required = [
            ("full name", &self.full_name),
            ("address", &self.address),
            ("city", &self.city),
            ("state", &self.state),
            ("postal code", &self.postal_code),
            ("country", &self.country),
            ("phone", &self.phone),
        ];
        for (label, value) in required {
            if value.trim().is_empty() {
                return Err(AppError::Validation(format!("{label} is required")));
            }
        }
        Ok(())
    }
}

/// Profile and address book operations.
pub struct ProfileService<'a> {
    rest: &'a RestClient,
}

impl<'a> ProfileService<'a> {
    /// Create a new profile service.
    #[must_use]
    pub const fn new(rest: &'a RestClient) -> Self {
        Self { rest }
    }

    /// Fetch a user's profile record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` when no profile exists.
    #[instrument(skip(self))]
    pub async fn get(&self, user_id: UserId) -> Result<UserProfile> {
        self.rest
            .select_single("user_profiles", &Query::new().eq("id", user_id))
            .await
            .map_err(|e| match e {
                BackendError::NotFound => AppError::NotFound(format!("profile for {user_id}")),
                other => other.into(),
            })
    }

    /// The user's saved addresses, default first.
    ///
    /// # Errors
    ///
    /// Returns a (retryable) backend error if the select fails.
    #[instrument(skip(self))]
    pub async fn addresses(&self, user_id: UserId) -> Result<Vec<ShippingAddress>> {
        let query = Query::new()
            .eq("user_id", user_id)
            .order_by("is_default", SortDirection::Descending);
        Ok(self.rest.select("shipping_addresses", &query).await?)
    }

    /// Save a new address.
    ///
    /// # Errors
    ///
    /// Returns a validation error for blank required fields.
    #[instrument(skip(self, address), fields(user_id = %address.user_id))]
    pub async fn add_address(&self, address: &NewAddress) -> Result<()> {
        address.validate()?;
        Ok(self.rest.insert("shipping_addresses", address).await?)
    }

    /// Replace a saved address.
    ///
    /// # Errors
    ///
    /// Returns a validation error for blank required fields.
    #[instrument(skip(self, address))]
    pub async fn update_address(&self, id: AddressId, address: &NewAddress) -> Result<()> {
        address.validate()?;
        Ok(self
            .rest
            .update("shipping_addresses", &Query::new().eq("id", id), address)
            .await?)
    }

    /// Delete a saved address.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the delete is rejected.
    #[instrument(skip(self))]
    pub async fn delete_address(&self, id: AddressId) -> Result<()> {
        Ok(self
            .rest
            .delete("shipping_addresses", &Query::new().eq("id", id))
            .await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn address() -> NewAddress {
        NewAddress {
            user_id: UserId::generate(),
            full_name: "Test User".to_string(),
            address: "1 Main St".to_string(),
            city: "Springfield".to_string(),
            state: "IL".to_string(),
            postal_code: "62701".to_string(),
            country: "US".to_string(),
            phone: "+1 555 0100".to_string(),
            is_default: true,
        }
    }

    #[test]
    fn test_address_validation_accepts_complete_address() {
        assert!(address().validate().is_ok());
    }

    #[test]
    fn test_address_validation_rejects_blank_field() {
        let mut bad = address();
        bad.postal_code = String::new();

        let err = bad.validate().unwrap_err();
        assert!(matches!(err, AppError::Validation(ref msg) if msg.contains("postal code")));
    }

    #[test]
    fn test_profile_deserializes_with_missing_optionals() {
        let profile: UserProfile = serde_json::from_value(serde_json::json!({
            "id": uuid::Uuid::new_v4().to_string(),
        }))
        .unwrap();

        assert_eq!(profile.role, UserRole::User);
        assert!(profile.full_name.is_none());
        assert!(!profile.email_verified);
    }
}
