//! Checkout and order history.
//!
//! Checkout validates the shipping form, prices the cart (flat shipping
//! waived over the free-shipping threshold, flat-rate tax), records the
//! order and leaves clearing the cart to the caller. Payment itself is an
//! external collaborator and is not processed here.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, instrument};

use luxe_core::{AuthUser, Cart, Order, OrderAddress, OrderId, OrderItem, OrderStatus, UserId};

use crate::backend::{BackendError, Query, RestClient, SortDirection};
use crate::error::{AppError, Result};

/// Pricing of a checkout: subtotal plus shipping and tax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl OrderTotals {
    /// Price a cart subtotal.
    ///
    /// Shipping is a flat 10, waived when the subtotal exceeds 100; tax is a
    /// flat 10% of the subtotal.
    #[must_use]
    pub fn compute(subtotal: Decimal) -> Self {
        let free_shipping_over = Decimal::new(100, 0);
        let flat_shipping = Decimal::new(10, 0);
        let tax_rate = Decimal::new(1, 1);

        let shipping = if subtotal > free_shipping_over {
            Decimal::ZERO
        } else {
            flat_shipping
        };
        let tax = subtotal * tax_rate;

        Self {
            subtotal,
            shipping,
            tax,
            total: subtotal + shipping + tax,
        }
    }
}

/// Shipping details collected at checkout.
#[derive(Debug, Clone, Default)]
pub struct CheckoutForm {
    pub full_name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
}

impl CheckoutForm {
    /// Reject the form before any remote call when a required field is blank.
    fn validate(&self) -> Result<()> {
        let required = [
            ("full name", &self.full_name),
            ("address", &self.address),
            ("city", &self.city),
            ("state", &self.state),
            ("zip code", &self.zip_code),
            ("country", &self.country),
        ];
        for (label, value) in required {
            if value.trim().is_empty() {
                return Err(AppError::Validation(format!("{label} is required")));
            }
        }
        Ok(())
    }

    fn shipping_address(&self) -> OrderAddress {
        OrderAddress {
            street: self.address.trim().to_string(),
            city: self.city.trim().to_string(),
            state: self.state.trim().to_string(),
            zip: self.zip_code.trim().to_string(),
            country: self.country.trim().to_string(),
        }
    }
}

/// Row inserted into `orders` (generated columns omitted).
#[derive(Debug, Serialize)]
struct NewOrderRecord {
    user_id: UserId,
    items: Vec<OrderItem>,
    total: Decimal,
    status: OrderStatus,
    shipping_address: OrderAddress,
}

/// Order placement and history.
pub struct OrderService<'a> {
    rest: &'a RestClient,
}

impl<'a> OrderService<'a> {
    /// Create a new order service.
    #[must_use]
    pub const fn new(rest: &'a RestClient) -> Self {
        Self { rest }
    }

    /// Place an order for the signed-in user's cart.
    ///
    /// The caller clears the cart after this returns successfully.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty cart or incomplete form, and a
    /// backend error if the insert is rejected.
    #[instrument(skip(self, user, cart, form), fields(user_id = %user.id))]
    pub async fn checkout(
        &self,
        user: &AuthUser,
        cart: &Cart,
        form: &CheckoutForm,
    ) -> Result<Order> {
        if cart.is_empty() {
            return Err(AppError::Validation("cart is empty".to_string()));
        }
        form.validate()?;

        let totals = OrderTotals::compute(cart.subtotal());
        let record = NewOrderRecord {
            user_id: user.id,
            items: cart.lines().iter().map(OrderItem::from).collect(),
            total: totals.total,
            status: OrderStatus::Paid,
            shipping_address: form.shipping_address(),
        };

        let created: Vec<Order> = self.rest.insert_returning("orders", &record).await?;
        let order = created
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound("created order missing from response".to_string()))?;

        info!(order_id = %order.id, total = %order.total, "order placed");
        Ok(order)
    }

    /// The user's order history, newest first.
    ///
    /// # Errors
    ///
    /// Returns a (retryable) backend error if the select fails.
    #[instrument(skip(self))]
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let query = Query::new()
            .eq("user_id", user_id)
            .order_by("created_at", SortDirection::Descending);
        Ok(self.rest.select("orders", &query).await?)
    }

    /// A single order by ID.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown order.
    #[instrument(skip(self))]
    pub async fn get(&self, order_id: OrderId) -> Result<Order> {
        self.rest
            .select_single("orders", &Query::new().eq("id", order_id))
            .await
            .map_err(|e| match e {
                BackendError::NotFound => AppError::NotFound(format!("order {order_id}")),
                other => other.into(),
            })
    }

}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_totals_below_threshold_pay_shipping() {
        let totals = OrderTotals::compute(Decimal::new(4999, 2));
        assert_eq!(totals.shipping, Decimal::new(10, 0));
        assert_eq!(totals.tax, Decimal::new(4999, 3));
        assert_eq!(totals.total, Decimal::new(64989, 3));
    }

    #[test]
    fn test_totals_above_threshold_ship_free() {
        let totals = OrderTotals::compute(Decimal::new(150, 0));
        assert_eq!(totals.shipping, Decimal::ZERO);
        assert_eq!(totals.tax, Decimal::new(15, 0));
        assert_eq!(totals.total, Decimal::new(165, 0));
    }

    #[test]
    fn test_totals_at_exactly_threshold_still_pay_shipping() {
        // The waiver requires strictly more than 100
        let totals = OrderTotals::compute(Decimal::new(100, 0));
        assert_eq!(totals.shipping, Decimal::new(10, 0));
    }

    #[test]
    fn test_form_validation_catches_blank_fields() {
        let form = CheckoutForm {
            full_name: "Test User".to_string(),
            address: "1 Main St".to_string(),
            city: "  ".to_string(),
            state: "IL".to_string(),
            zip_code: "62701".to_string(),
            country: "US".to_string(),
        };

        let err = form.validate().unwrap_err();
        assert!(matches!(err, AppError::Validation(ref msg) if msg.contains("city")));
    }

    #[test]
    fn test_form_maps_to_order_address() {
        let form = CheckoutForm {
            full_name: "Test User".to_string(),
            address: " 1 Main St ".to_string(),
            city: "Springfield".to_string(),
            state: "IL".to_string(),
            zip_code: "62701".to_string(),
            country: "US".to_string(),
        };

        let address = form.shipping_address();
        assert_eq!(address.street, "1 Main St");
        assert_eq!(address.zip, "62701");
    }
}
