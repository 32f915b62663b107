//! CLI commands.
//!
//! Every invocation is one short-lived "tab" on the durable store under
//! `CARTSYNC_STORAGE_DIR`; running two invocations at once behaves like two
//! tabs of the same browser profile.

pub mod cart;
pub mod listen;
pub mod order;
pub mod wishlist;

use std::path::PathBuf;
use std::sync::Arc;

use cartsync_client::ClientError;
use cartsync_client::config::ClientConfig;
use cartsync_client::context::TabContext;
use cartsync_client::identity::{FileIdentity, IdentitySource, StaticIdentity};
use cartsync_client::store::{FileBackend, StorageArea};
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid checkout payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

/// Open store, identity and configuration for one invocation.
pub struct Session {
    pub config: ClientConfig,
    pub ctx: TabContext,
}

impl Session {
    /// Open the durable store and resolve the identity source.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage directory cannot be created.
    pub fn open(config: ClientConfig, identity: Option<PathBuf>) -> Result<Self, CommandError> {
        let backend = FileBackend::open(&config.storage_dir).map_err(ClientError::from)?;
        let area = StorageArea::new(backend);
        let identity: Arc<dyn IdentitySource> = match identity {
            Some(path) => Arc::new(FileIdentity::new(path)),
            None => Arc::new(StaticIdentity::anonymous()),
        };
        let ctx = TabContext::with_shipping(&area, identity, config.shipping);
        tracing::debug!(actor = %ctx.actor(), dir = %config.storage_dir.display(), "Session opened");
        Ok(Self { config, ctx })
    }
}
