//! Orders and shipping addresses.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::cart::CartLine;
use super::id::{AddressId, OrderId, ProductId, UserId};

/// Order lifecycle status.
///
/// `Paid` is what checkout writes after the (stubbed) payment step; the
/// remaining states are driven by the back office.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    Processing,
    Completed,
    Cancelled,
}

/// A trimmed per-line snapshot stored on an order.
///
/// Orders do not carry the full product snapshot - only what the order
/// history and back office need to display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    /// The ordered product.
    pub product_id: ProductId,
    /// Product name at order time.
    pub name: String,
    /// Units ordered.
    pub quantity: u32,
    /// Unit price at order time.
    pub price: Decimal,
    /// Selected size (null when the product has none).
    pub size: Option<String>,
    /// Selected color (null when the product has none).
    pub color: Option<String>,
}

impl From<&CartLine> for OrderItem {
    fn from(line: &CartLine) -> Self {
        Self {
            product_id: line.product.id,
            name: line.product.name.clone(),
            quantity: line.quantity,
            price: line.product.price,
            size: line.selected_size.clone(),
            color: line.selected_color.clone(),
        }
    }
}

/// The shipping destination snapshot stored on an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Unique order ID.
    pub id: OrderId,
    /// The user who placed the order.
    pub user_id: UserId,
    /// Ordered items.
    pub items: Vec<OrderItem>,
    /// Grand total (subtotal + shipping + tax).
    pub total: Decimal,
    /// Lifecycle status.
    pub status: OrderStatus,
    /// Shipping destination.
    pub shipping_address: OrderAddress,
    /// When the order was placed.
    pub created_at: DateTime<Utc>,
}

/// A saved shipping address on a user's profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingAddress {
    /// Unique address ID.
    pub id: AddressId,
    /// Owning user.
    pub user_id: UserId,
    /// Recipient name.
    pub full_name: String,
    /// Street address.
    pub address: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub phone: String,
    /// Whether this is the user's default address.
    #[serde(default)]
    pub is_default: bool,
}
