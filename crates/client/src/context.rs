//! Per-tab context.

use std::sync::Arc;

use cartsync_core::ActorKey;

use crate::bus::{Subscription, SyncBus};
use crate::cart::ShippingPolicy;
use crate::identity::{IdentitySource, resolve_actor_key};
use crate::store::{KeyedStore, Namespace, StorageArea};

/// Everything one tab needs: who is signed in, where state is persisted and
/// how the tab's UI fragments are told about changes.
///
/// This struct is cheaply cloneable via `Arc`. Components such as
/// [`Cart`](crate::cart::Cart) and [`OrderClient`](crate::orders::OrderClient)
/// are built from it instead of reaching for globals.
#[derive(Clone)]
pub struct TabContext {
    inner: Arc<TabContextInner>,
}

struct TabContextInner {
    identity: Arc<dyn IdentitySource>,
    store: KeyedStore,
    bus: SyncBus,
    shipping: ShippingPolicy,
}

impl TabContext {
    /// Open a tab on a storage area with free shipping.
    #[must_use]
    pub fn new(area: &StorageArea, identity: Arc<dyn IdentitySource>) -> Self {
        Self::with_shipping(area, identity, ShippingPolicy::default())
    }

    /// Open a tab on a storage area with the given shipping policy.
    #[must_use]
    pub fn with_shipping(
        area: &StorageArea,
        identity: Arc<dyn IdentitySource>,
        shipping: ShippingPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(TabContextInner {
                identity,
                store: area.open_tab(),
                bus: SyncBus::new(),
                shipping,
            }),
        }
    }

    /// Actor currently signed in, resolved afresh on every call.
    #[must_use]
    pub fn actor(&self) -> ActorKey {
        resolve_actor_key(self.inner.identity.as_ref())
    }

    #[must_use]
    pub fn store(&self) -> &KeyedStore {
        &self.inner.store
    }

    #[must_use]
    pub fn bus(&self) -> &SyncBus {
        &self.inner.bus
    }

    #[must_use]
    pub fn shipping(&self) -> &ShippingPolicy {
        &self.inner.shipping
    }

    /// Listen for changes to the given namespaces from this and other tabs.
    ///
    /// Dropping the returned subscription unsubscribes.
    #[must_use]
    pub fn subscribe(&self, namespaces: &[Namespace]) -> Subscription {
        Subscription::new(self.clone(), namespaces)
    }
}
