//! cartsync client library.
//!
//! Cart, wishlist and order bookkeeping for one browser profile. Several tabs
//! share one [`StorageArea`](store::StorageArea); each tab works through its
//! own [`TabContext`](context::TabContext), and the tabs stay consistent
//! through storage change notifications and in-page events.
//!
//! # Modules
//!
//! - [`identity`] - Resolve the signed-in actor from the session record
//! - [`store`] - Actor-partitioned durable store with change notifications
//! - [`cart`] - Cart normalization, totals and mutations
//! - [`wishlist`] - Saved products
//! - [`bus`] - In-page events and merged subscriptions
//! - [`orders`] - Local-first order submission and history
//! - [`live`] - Push channel for order status updates

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod bus;
pub mod cart;
pub mod config;
pub mod context;
pub mod error;
pub mod identity;
pub mod live;
pub mod orders;
pub mod origin;
pub mod store;
pub mod wishlist;

pub use error::{ClientError, Result};
