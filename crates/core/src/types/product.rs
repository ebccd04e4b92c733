//! Product reference data.
//!
//! Products are owned by the remote store; this type is the read-only snapshot
//! every other part of the system works with.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::ProductId;

/// Stock level at or below which a product counts as low-stock in the back
/// office.
pub const LOW_STOCK_THRESHOLD: u32 = 10;

/// A catalog product.
///
/// Stock is a `u32`, so the `stock >= 0` invariant holds by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Unique product ID.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Long-form description.
    pub description: String,
    /// Unit price.
    pub price: Decimal,
    /// Category slug (e.g., "men", "women", "accessories").
    pub category: String,
    /// Image URLs.
    pub images: Vec<String>,
    /// Available sizes.
    pub sizes: Vec<String>,
    /// Available colors.
    pub colors: Vec<String>,
    /// Units in stock.
    pub stock: u32,
    /// When the product was created.
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Whether the product's stock is below the back-office alert threshold.
    #[must_use]
    pub const fn is_low_stock(&self) -> bool {
        self.stock < LOW_STOCK_THRESHOLD
    }

    /// Whether the product can currently be added to a cart.
    #[must_use]
    pub const fn in_stock(&self) -> bool {
        self.stock > 0
    }
}
