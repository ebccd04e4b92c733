//! Core types for Luxe.
//!
//! This module provides type-safe wrappers for common domain concepts and the
//! pure cart model.

pub mod cart;
pub mod email;
pub mod id;
pub mod identity;
pub mod order;
pub mod password;
pub mod product;

pub use cart::{Cart, CartLine};
pub use email::{Email, EmailError};
pub use id::*;
pub use identity::{AuthUser, Identity, UserRole};
pub use order::{Order, OrderAddress, OrderItem, OrderStatus, ShippingAddress};
pub use password::{PasswordError, validate_password};
pub use product::Product;
