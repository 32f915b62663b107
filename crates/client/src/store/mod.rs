//! Keyed persistent store.
//!
//! All durable client state lives under keys of the form
//! `<namespace>_<actor>`. The [`StorageArea`] models the durable storage of
//! one browser profile: every tab opened from it shares the same backend, and
//! every committed write is announced to the *other* tabs through a
//! broadcast channel.
//!
//! # Failure policy
//!
//! Reads never fail. A missing key yields the default value, and so does a
//! value that no longer deserializes (a corrupt or half-written record from an
//! older build). Writes are synchronous and report backend errors.

mod backend;

use std::fmt;
use std::sync::Arc;

use cartsync_core::ActorKey;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

pub use backend::{FileBackend, MemoryBackend, StorageBackend};

/// Buffered storage notifications per subscriber before it starts lagging.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Errors that can occur when writing to the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be read or written.
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The value could not be serialized.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Persisted state partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Cart,
    Wishlist,
    PendingOrders,
    OrderHistory,
}

impl Namespace {
    /// Every namespace.
    pub const ALL: [Self; 4] = [
        Self::Cart,
        Self::Wishlist,
        Self::PendingOrders,
        Self::OrderHistory,
    ];

    /// Key prefix of the namespace.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cart => "cart",
            Self::Wishlist => "wishlist",
            Self::PendingOrders => "pending_orders",
            Self::OrderHistory => "orders",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully qualified persisted key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey {
    namespace: Namespace,
    actor: ActorKey,
}

impl StorageKey {
    #[must_use]
    pub const fn new(namespace: Namespace, actor: ActorKey) -> Self {
        Self { namespace, actor }
    }

    #[must_use]
    pub const fn namespace(&self) -> Namespace {
        self.namespace
    }

    #[must_use]
    pub const fn actor(&self) -> &ActorKey {
        &self.actor
    }

    /// Recover namespace and actor from a raw key.
    ///
    /// Returns `None` for keys that do not belong to a known namespace.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Namespace::ALL.into_iter().find_map(|namespace| {
            let actor = raw.strip_prefix(namespace.as_str())?.strip_prefix('_')?;
            if actor.is_empty() {
                return None;
            }
            Some(Self::new(namespace, ActorKey::new(actor)))
        })
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.namespace, self.actor)
    }
}

/// Identifies one open tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TabId(Uuid);

impl TabId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Notification that a persisted key changed.
#[derive(Debug, Clone)]
pub struct StorageChange {
    /// Raw key that changed.
    pub key: String,
    /// New serialized value, `None` if the key was removed.
    pub new_value: Option<String>,
    /// Tab that performed the write.
    pub source: TabId,
}

/// Durable storage of one browser profile, shared by all of its tabs.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct StorageArea {
    inner: Arc<StorageAreaInner>,
}

struct StorageAreaInner {
    backend: Box<dyn StorageBackend>,
    changes: broadcast::Sender<StorageChange>,
}

impl StorageArea {
    /// Create a storage area over a backend.
    #[must_use]
    pub fn new(backend: impl StorageBackend + 'static) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(StorageAreaInner {
                backend: Box::new(backend),
                changes,
            }),
        }
    }

    /// Create a storage area backed by memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// Open a new tab on this profile.
    #[must_use]
    pub fn open_tab(&self) -> KeyedStore {
        KeyedStore {
            area: self.clone(),
            tab: TabId::new(),
        }
    }
}

/// One tab's view of the durable store.
#[derive(Clone)]
pub struct KeyedStore {
    area: StorageArea,
    tab: TabId,
}

impl KeyedStore {
    /// Tab that owns this handle.
    #[must_use]
    pub const fn tab_id(&self) -> TabId {
        self.tab
    }

    /// Read a value, substituting `T::default()` when it is missing or corrupt.
    #[must_use]
    pub fn read<T: DeserializeOwned + Default>(&self, namespace: Namespace, actor: &ActorKey) -> T {
        self.read_or(namespace, actor, T::default())
    }

    /// Read a value, substituting `default` when it is missing or corrupt.
    #[must_use]
    pub fn read_or<T: DeserializeOwned>(
        &self,
        namespace: Namespace,
        actor: &ActorKey,
        default: T,
    ) -> T {
        let key = StorageKey::new(namespace, actor.clone());
        let Some(raw) = self.read_raw(&key) else {
            return default;
        };
        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Discarding corrupt stored value");
                default
            }
        }
    }

    /// Read the stored string as-is.
    #[must_use]
    pub fn read_raw(&self, key: &StorageKey) -> Option<String> {
        match self.area.inner.backend.get(&key.to_string()) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Storage read failed");
                None
            }
        }
    }

    /// Serialize and commit a value, then notify the other tabs.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the backend write fails.
    pub fn write<T: Serialize + ?Sized>(
        &self,
        namespace: Namespace,
        actor: &ActorKey,
        value: &T,
    ) -> Result<(), StoreError> {
        let key = StorageKey::new(namespace, actor.clone()).to_string();
        let serialized = serde_json::to_string(value)?;
        self.area.inner.backend.set(&key, &serialized)?;
        self.announce(key, Some(serialized));
        Ok(())
    }

    /// Delete a value, then notify the other tabs.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    pub fn remove(&self, namespace: Namespace, actor: &ActorKey) -> Result<(), StoreError> {
        let key = StorageKey::new(namespace, actor.clone()).to_string();
        self.area.inner.backend.remove(&key)?;
        self.announce(key, None);
        Ok(())
    }

    /// Subscribe to writes made by other tabs.
    #[must_use]
    pub fn foreign_changes(&self) -> ForeignChanges {
        ForeignChanges {
            receiver: self.area.inner.changes.subscribe(),
            tab: self.tab,
        }
    }

    fn announce(&self, key: String, new_value: Option<String>) {
        // No receivers just means no other tab is listening.
        let _ = self.area.inner.changes.send(StorageChange {
            key,
            new_value,
            source: self.tab,
        });
    }
}

/// Outcome of waiting for a storage notification.
#[derive(Debug)]
pub enum ChangeEvent {
    Changed(StorageChange),
    /// Notifications were dropped; listeners should re-read.
    Lagged(u64),
}

/// Storage notifications from every tab except the subscriber's own.
pub struct ForeignChanges {
    receiver: broadcast::Receiver<StorageChange>,
    tab: TabId,
}

impl ForeignChanges {
    /// Wait for the next change made by another tab.
    ///
    /// Returns `None` once the storage area is gone.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(change) if change.source == self.tab => {}
                Ok(change) => return Some(ChangeEvent::Changed(change)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    return Some(ChangeEvent::Lagged(skipped));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
