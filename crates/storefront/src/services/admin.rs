//! Admin back office: product management and the dashboard.
//!
//! Every operation is gated on the admin role. Product images go to object
//! storage under `product-images/` and their public URLs land in the
//! product's `images` list.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use luxe_core::{AuthUser, Product, ProductId};

use crate::backend::{BackendError, Query, RestClient, SortDirection, StorageClient};
use crate::error::{AppError, Result};

/// Storage bucket product images live in.
const IMAGE_BUCKET: &str = "products";

/// Path prefix for uploaded product images.
const IMAGE_PREFIX: &str = "product-images";

/// A product as entered in the back office, before the backend assigns
/// generated columns.
#[derive(Debug, Clone, Serialize)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub category: String,
    pub images: Vec<String>,
    pub sizes: Vec<String>,
    pub colors: Vec<String>,
    pub stock: u32,
}

impl NewProduct {
    /// Drop blank entries from the list fields (the form keeps empty rows
    /// around for editing).
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.images.retain(|i| !i.trim().is_empty());
        self.sizes.retain(|s| !s.trim().is_empty());
        self.colors.retain(|c| !c.trim().is_empty());
        self
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("product name is required".to_string()));
        }
        if self.category.trim().is_empty() {
            return Err(AppError::Validation("category is required".to_string()));
        }
        if self.price.is_sign_negative() {
            return Err(AppError::Validation("price cannot be negative".to_string()));
        }
        if self.images.is_empty() {
            return Err(AppError::Validation(
                "please provide at least one image (upload a file or enter a URL)".to_string(),
            ));
        }
        Ok(())
    }
}

/// Dashboard headline numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardStats {
    pub total_orders: u64,
    pub total_users: u64,
    pub total_revenue: Decimal,
    pub total_inventory_value: Decimal,
}

/// Row shape used when only order totals are needed.
#[derive(Debug, Deserialize)]
struct OrderTotalRow {
    total: Decimal,
}

/// Back office operations.
pub struct AdminService<'a> {
    rest: &'a RestClient,
    storage: &'a StorageClient,
}

impl<'a> AdminService<'a> {
    /// Create a new admin service.
    #[must_use]
    pub const fn new(rest: &'a RestClient, storage: &'a StorageClient) -> Self {
        Self { rest, storage }
    }

    fn require_admin(user: &AuthUser) -> Result<()> {
        if user.is_admin() {
            Ok(())
        } else {
            Err(AppError::Unauthorized("admin role required".to_string()))
        }
    }

    /// All products, newest first (the back office pages client-side).
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` for non-admins, or a backend error.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn list_products(&self, user: &AuthUser) -> Result<Vec<Product>> {
        Self::require_admin(user)?;
        let query = Query::new().order_by("created_at", SortDirection::Descending);
        Ok(self.rest.select("products", &query).await?)
    }

    /// Create a product.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` for non-admins, a validation error for bad
    /// input, or a backend error.
    #[instrument(skip(self, user, product), fields(user_id = %user.id))]
    pub async fn create_product(&self, user: &AuthUser, product: NewProduct) -> Result<Product> {
        Self::require_admin(user)?;
        let product = product.normalized();
        product.validate()?;

        let created: Vec<Product> = self.rest.insert_returning("products", &product).await?;
        let product = created.into_iter().next().ok_or_else(|| {
            AppError::NotFound("created product missing from response".to_string())
        })?;

        info!(product_id = %product.id, "product created");
        Ok(product)
    }

    /// Update a product and return its stored representation.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` for non-admins, a validation error for bad
    /// input, `NotFound` for an unknown ID, or a backend error.
    #[instrument(skip(self, user, product), fields(user_id = %user.id))]
    pub async fn update_product(
        &self,
        user: &AuthUser,
        id: ProductId,
        product: NewProduct,
    ) -> Result<Product> {
        Self::require_admin(user)?;
        let product = product.normalized();
        product.validate()?;

        self.rest
            .update("products", &Query::new().eq("id", id), &product)
            .await?;

        self.rest
            .select_single("products", &Query::new().eq("id", id))
            .await
            .map_err(|e| match e {
                BackendError::NotFound => AppError::NotFound(format!("product {id}")),
                other => other.into(),
            })
    }

    /// Delete a product.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` for non-admins, or a backend error.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn delete_product(&self, user: &AuthUser, id: ProductId) -> Result<()> {
        Self::require_admin(user)?;
        self.rest
            .delete("products", &Query::new().eq("id", id))
            .await?;
        info!(product_id = %id, "product deleted");
        Ok(())
    }

    /// Upload a product image and return its public URL.
    ///
    /// The stored name is a fresh UUID with the original extension, under
    /// the `product-images/` prefix.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` for non-admins, or a backend error.
    #[instrument(skip(self, user, bytes), fields(user_id = %user.id, len = bytes.len()))]
    pub async fn upload_product_image(
        &self,
        user: &AuthUser,
        file_name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        Self::require_admin(user)?;
        let path = image_path(file_name);
        Ok(self
            .storage
            .upload(IMAGE_BUCKET, &path, bytes, content_type)
            .await?)
    }

    /// Dashboard headline numbers.
    ///
    /// User and inventory totals come from backend functions; order count
    /// and revenue are folded from the orders collection.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` for non-admins, or a (retryable) backend error.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn stats(&self, user: &AuthUser) -> Result<DashboardStats> {
        Self::require_admin(user)?;

        let total_users: u64 = self
            .rest
            .rpc("get_total_users", &serde_json::json!({}))
            .await?;
        let total_inventory_value: Decimal = self
            .rest
            .rpc("get_total_inventory_value", &serde_json::json!({}))
            .await?;

        let orders: Vec<OrderTotalRow> = self.rest.select("orders", &Query::new()).await?;
        let total_revenue = orders.iter().map(|o| o.total).sum();

        Ok(DashboardStats {
            total_orders: u64::try_from(orders.len()).unwrap_or_default(),
            total_users,
            total_revenue,
            total_inventory_value,
        })
    }
}

/// Storage path for an uploaded image: `product-images/<uuid>.<ext>`.
fn image_path(file_name: &str) -> String {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.len() <= 8)
        .unwrap_or("bin");
    format!("{IMAGE_PREFIX}/{}.{extension}", Uuid::new_v4())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use luxe_core::{Email, UserId, UserRole};

    use super::*;

    fn admin() -> AuthUser {
        AuthUser {
            id: UserId::generate(),
            email: Email::parse("admin@example.com").unwrap(),
            email_verified: true,
            role: UserRole::Admin,
            full_name: None,
            phone: None,
            last_login: None,
        }
    }

    fn shopper() -> AuthUser {
        AuthUser {
            role: UserRole::User,
            ..admin()
        }
    }

    fn new_product() -> NewProduct {
        NewProduct {
            name: "Linen Shirt".to_string(),
            description: "A shirt".to_string(),
            price: Decimal::new(4999, 2),
            category: "men".to_string(),
            images: vec!["https://cdn.example.com/shirt.jpg".to_string()],
            sizes: vec!["S".to_string(), "M".to_string()],
            colors: vec!["Black".to_string()],
            stock: 25,
        }
    }

    #[test]
    fn test_require_admin() {
        assert!(AdminService::require_admin(&admin()).is_ok());
        assert!(matches!(
            AdminService::require_admin(&shopper()),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_normalized_drops_blank_entries() {
        let mut product = new_product();
        product.sizes = vec!["S".to_string(), " ".to_string(), String::new()];
        product.colors = vec![String::new()];
        product.images.push("  ".to_string());

        let normalized = product.normalized();
        assert_eq!(normalized.sizes, vec!["S".to_string()]);
        assert!(normalized.colors.is_empty());
        assert_eq!(normalized.images.len(), 1);
    }

    #[test]
    fn test_validation_requires_an_image() {
        let mut product = new_product();
        product.images.clear();

        let err = product.validate().unwrap_err();
        assert!(matches!(err, AppError::Validation(ref msg) if msg.contains("image")));
    }

    #[test]
    fn test_validation_rejects_negative_price() {
        let mut product = new_product();
        product.price = Decimal::new(-1, 0);
        assert!(product.validate().is_err());
    }

    #[test]
    fn test_image_path_keeps_extension() {
        let path = image_path("photo.JPG");
        assert!(path.starts_with("product-images/"));
        assert!(path.ends_with(".JPG"));
    }

    #[test]
    fn test_image_path_defaults_unknown_extension() {
        assert!(image_path("no-extension").ends_with(".bin"));
        assert!(image_path("trailing-dot.").ends_with(".bin"));
    }
}
