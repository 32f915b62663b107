//! Core types for cartsync.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod actor;
pub mod id;
pub mod money;
pub mod status;

pub use actor::ActorKey;
pub use id::*;
pub use money::{format_amount, round_cents};
pub use status::OrderStatus;
