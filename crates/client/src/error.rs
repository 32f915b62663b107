//! Unified error type.
//!
//! Each component has its own error enum; `ClientError` gathers them for
//! callers (such as the CLI) that drive several components at once.

use thiserror::Error;

use crate::config::ConfigError;
use crate::live::ChannelError;
use crate::orders::{ConfirmError, FetchError, OrderError};
use crate::origin::OriginError;
use crate::store::StoreError;

/// Errors of the cart and order layer.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid origin: {0}")]
    Origin(#[from] OriginError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Confirmation error: {0}")]
    Confirm(#[from] ConfirmError),

    #[error("History fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Push channel error: {0}")]
    Channel(#[from] ChannelError),

    /// HTTP client could not be set up.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for the client layer.
pub type Result<T> = std::result::Result<T, ClientError>;
