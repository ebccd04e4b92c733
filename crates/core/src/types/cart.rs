//! The cart model.
//!
//! A cart is an ordered list of line items keyed by the (product, size, color)
//! triple. All operations are pure list transformations: they never fail and
//! never touch the network - clamping against the stock snapshot carried on
//! the line is the only "validation". Remote persistence of the resulting
//! list is the synchronization engine's job, not the model's.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::product::Product;

/// One cart line: a product snapshot plus quantity and the selected variant.
///
/// Two lines with the same product but a different size or color are distinct.
/// The product fields are flattened so the serialized shape matches the
/// `user_cart.cart_items` records in the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    /// Snapshot of the product at the time it was added (including the stock
    /// value the quantity clamp runs against).
    #[serde(flatten)]
    pub product: Product,
    /// Units of this line. Always at least 1 and at most the snapshot stock.
    pub quantity: u32,
    /// Selected size, if the product has sizes.
    #[serde(
        rename = "selectedSize",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub selected_size: Option<String>,
    /// Selected color, if the product has colors.
    #[serde(
        rename = "selectedColor",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub selected_color: Option<String>,
}

impl CartLine {
    /// Create a line from a product snapshot, clamping the quantity.
    #[must_use]
    pub fn new(
        product: Product,
        quantity: u32,
        selected_size: Option<String>,
        selected_color: Option<String>,
    ) -> Self {
        let quantity = clamp_quantity(quantity, product.stock);
        Self {
            product,
            quantity,
            selected_size,
            selected_color,
        }
    }

    /// The merge/dedup identity of this line.
    #[must_use]
    pub fn key(&self) -> (ProductId, Option<&str>, Option<&str>) {
        (
            self.product.id,
            self.selected_size.as_deref(),
            self.selected_color.as_deref(),
        )
    }

    /// Whether `other` is the same line for merge purposes.
    #[must_use]
    pub fn same_line(&self, other: &Self) -> bool {
        self.key() == other.key()
    }

    /// Price of this line (unit price times quantity).
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.product.price * Decimal::from(self.quantity)
    }
}

/// Clamp a requested quantity against a stock snapshot.
///
/// Quantities are capped at the snapshot stock and floored at 1, so a stale
/// stock-0 snapshot can never zero out a line.
#[must_use]
pub(crate) const fn clamp_quantity(quantity: u32, stock: u32) -> u32 {
    let clamped = if quantity < stock { quantity } else { stock };
    if clamped < 1 { 1 } else { clamped }
}

/// An ordered sequence of cart lines.
///
/// Insertion order is preserved when appending new lines but carries no other
/// meaning.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cart(Vec<CartLine>);

impl Cart {
    /// Create an empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Borrow the lines in order.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.0
    }

    /// Consume the cart, returning its lines.
    #[must_use]
    pub fn into_lines(self) -> Vec<CartLine> {
        self.0
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of lines (not units).
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Add a candidate line.
    ///
    /// If a line with the same (product, size, color) key exists, its quantity
    /// becomes `min(existing.quantity + line.quantity, line.stock)` - the
    /// clamp uses the *incoming* snapshot's stock, which is the freshest one.
    /// Otherwise the line is appended with its quantity clamped to its own
    /// stock. Never fails; silently clamps.
    pub fn add_line(&mut self, line: CartLine) {
        if let Some(existing) = self.0.iter_mut().find(|l| l.same_line(&line)) {
            existing.quantity =
                clamp_quantity(existing.quantity + line.quantity, line.product.stock);
        } else {
            let quantity = clamp_quantity(line.quantity, line.product.stock);
            self.0.push(CartLine { quantity, ..line });
        }
    }

    /// Remove the first line whose product matches `product_id`.
    ///
    /// Matching is by product id only: when two lines share a product and
    /// differ only by size or color, the first encountered is removed and the
    /// other remains. Known quirk, kept deliberately; see DESIGN.md.
    pub fn remove_line(&mut self, product_id: ProductId) {
        if let Some(pos) = self.0.iter().position(|l| l.product.id == product_id) {
            self.0.remove(pos);
        }
    }

    /// Set the quantity on every line whose product matches `product_id`,
    /// clamped to each line's own stock snapshot.
    ///
    /// A floor of 1 is the caller's responsibility (the UI's quantity
    /// controls never produce 0), though the clamp enforces it anyway.
    pub fn set_quantity(&mut self, product_id: ProductId, quantity: u32) {
        for line in self.0.iter_mut().filter(|l| l.product.id == product_id) {
            line.quantity = clamp_quantity(quantity, line.product.stock);
        }
    }

    /// Remove all lines.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Merge another cart's lines into this one.
    ///
    /// For each incoming line: a line with the same key has its quantity set
    /// to `min(existing.quantity + incoming.quantity, incoming.stock)`;
    /// otherwise the incoming line is appended, clamped to its own stock. The
    /// stock used is the incoming line's captured snapshot - current remote
    /// stock is not consulted.
    pub fn merge_from(&mut self, other: &Self) {
        for line in &other.0 {
            self.add_line(line.clone());
        }
    }

    /// Derived subtotal: `sum(line price * quantity)`. Computed on demand,
    /// never stored.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.0.iter().map(CartLine::line_total).sum()
    }

    /// Derived unit count across all lines.
    #[must_use]
    pub fn total_quantity(&self) -> u32 {
        self.0.iter().map(|l| l.quantity).sum()
    }
}

impl From<Vec<CartLine>> for Cart {
    fn from(lines: Vec<CartLine>) -> Self {
        Self(lines)
    }
}
