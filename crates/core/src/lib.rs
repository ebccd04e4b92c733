//! Luxe Core - Shared domain types library.
//!
//! This crate provides the domain model shared across the Luxe storefront
//! components:
//! - `storefront` - The application core (cart sync, sessions, backend clients)
//!
//! # Architecture
//!
//! The core crate contains only types and pure domain logic - no I/O, no HTTP
//! clients, no storage. This keeps it lightweight and allows it to be used
//! anywhere, including in tests that never touch the network.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, email and password validation, and the product,
//!   cart, identity, and order domain model

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
