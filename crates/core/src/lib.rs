//! cartsync Core - Shared types library.
//!
//! This crate provides common types used across all cartsync components:
//! - `client` - Cart, wishlist and order bookkeeping for one browser profile
//! - `cli` - Command-line driver for the client layer
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no storage access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for actor keys, IDs, money and order statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
