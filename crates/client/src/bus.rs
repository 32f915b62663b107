//! Cross-tab sync bus.
//!
//! UI fragments (navigation badge, cart drawer, cart page, order list) keep no
//! shared in-memory state. They stay in agreement through two channels:
//!
//! 1. Storage notifications, delivered to every tab *except* the writer. This
//!    is how other tabs learn about a change.
//! 2. In-page events published by the mutator itself, so that the writing
//!    tab's other fragments update immediately.
//!
//! A [`Subscription`] merges both channels and applies the listener rules:
//! events for unwatched namespaces or for an actor other than the one
//! currently signed in are dropped, and an event whose payload is missing or
//! malformed is replaced by a fresh read of the store. Lost or truncated
//! events therefore heal on the next delivery.

use std::collections::VecDeque;

use cartsync_core::ActorKey;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::cart::{self, CartItem, CartState};
use crate::context::TabContext;
use crate::orders::{self, OrderHistoryEntry, PendingOrder};
use crate::store::{ChangeEvent, ForeignChanges, Namespace, StorageChange, StorageKey};
use crate::wishlist::{self, WishlistItem};

/// Buffered in-page events per subscriber before it starts lagging.
const PAGE_CHANNEL_CAPACITY: usize = 64;

/// Kind of in-page event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEventKind {
    CartUpdated,
    WishlistUpdated,
    OrdersUpdated,
    PendingOrdersUpdated,
}

impl PageEventKind {
    /// DOM-style event name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CartUpdated => "cart_updated",
            Self::WishlistUpdated => "wishlist_updated",
            Self::OrdersUpdated => "orders_updated",
            Self::PendingOrdersUpdated => "pending_orders_updated",
        }
    }

    /// Namespace the event reports on.
    #[must_use]
    pub const fn namespace(self) -> Namespace {
        match self {
            Self::CartUpdated => Namespace::Cart,
            Self::WishlistUpdated => Namespace::Wishlist,
            Self::OrdersUpdated => Namespace::OrderHistory,
            Self::PendingOrdersUpdated => Namespace::PendingOrders,
        }
    }
}

/// Coarse event body.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    /// The full item list.
    Items(Value),
    /// Only the number of items.
    Count(u64),
}

/// An in-page event.
#[derive(Debug, Clone)]
pub struct PageEvent {
    pub kind: PageEventKind,
    pub actor: ActorKey,
    pub payload: Option<EventPayload>,
}

impl PageEvent {
    /// `cart_updated` carrying the full item list.
    #[must_use]
    pub fn cart_updated(actor: ActorKey, items: &[CartItem]) -> Self {
        Self {
            kind: PageEventKind::CartUpdated,
            actor,
            payload: serde_json::to_value(items).ok().map(EventPayload::Items),
        }
    }

    /// `wishlist_updated` carrying a bare count.
    #[must_use]
    pub fn wishlist_updated(actor: ActorKey, count: usize) -> Self {
        Self {
            kind: PageEventKind::WishlistUpdated,
            actor,
            payload: Some(EventPayload::Count(u64::try_from(count).unwrap_or(u64::MAX))),
        }
    }

    /// `orders_updated` carrying the full history.
    #[must_use]
    pub fn orders_updated(actor: ActorKey, history: &[OrderHistoryEntry]) -> Self {
        Self {
            kind: PageEventKind::OrdersUpdated,
            actor,
            payload: serde_json::to_value(history).ok().map(EventPayload::Items),
        }
    }

    /// `pending_orders_updated` carrying the full pending list.
    #[must_use]
    pub fn pending_orders_updated(actor: ActorKey, pending: &[PendingOrder]) -> Self {
        Self {
            kind: PageEventKind::PendingOrdersUpdated,
            actor,
            payload: serde_json::to_value(pending).ok().map(EventPayload::Items),
        }
    }
}

/// What a listening fragment should now display.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncUpdate {
    Cart(CartState),
    Wishlist(Vec<WishlistItem>),
    Orders(Vec<OrderHistoryEntry>),
    PendingOrders(Vec<PendingOrder>),
    /// A count-only event, for badges.
    Count { namespace: Namespace, count: u64 },
}

/// In-page event channel of one tab.
#[derive(Debug, Clone)]
pub struct SyncBus {
    page: broadcast::Sender<PageEvent>,
}

impl SyncBus {
    #[must_use]
    pub fn new() -> Self {
        let (page, _) = broadcast::channel(PAGE_CHANNEL_CAPACITY);
        Self { page }
    }

    /// Dispatch an event to this tab's listeners.
    pub fn publish(&self, event: PageEvent) {
        tracing::trace!(event = event.kind.as_str(), actor = %event.actor, "Publishing page event");
        // No receivers just means no fragment is listening.
        let _ = self.page.send(event);
    }

    fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.page.subscribe()
    }
}

impl Default for SyncBus {
    fn default() -> Self {
        Self::new()
    }
}

enum Incoming {
    Page(Result<PageEvent, broadcast::error::RecvError>),
    Storage(Option<ChangeEvent>),
}

/// A fragment's live view of one or more namespaces.
pub struct Subscription {
    ctx: TabContext,
    namespaces: Vec<Namespace>,
    page: broadcast::Receiver<PageEvent>,
    storage: ForeignChanges,
    backlog: VecDeque<SyncUpdate>,
}

impl Subscription {
    pub(crate) fn new(ctx: TabContext, namespaces: &[Namespace]) -> Self {
        let page = ctx.bus().subscribe();
        let storage = ctx.store().foreign_changes();
        Self {
            ctx,
            namespaces: namespaces.to_vec(),
            page,
            storage,
            backlog: VecDeque::new(),
        }
    }

    /// Wait for the next update relevant to this subscription.
    ///
    /// Returns `None` if either channel closes. Both senders live in the tab
    /// context this subscription holds, so while it exists that cannot happen.
    pub async fn next(&mut self) -> Option<SyncUpdate> {
        loop {
            if let Some(update) = self.backlog.pop_front() {
                return Some(update);
            }

            let incoming = tokio::select! {
                page = self.page.recv() => Incoming::Page(page),
                change = self.storage.recv() => Incoming::Storage(change),
            };

            match incoming {
                Incoming::Page(Ok(event)) => {
                    if let Some(update) = self.on_page_event(event) {
                        return Some(update);
                    }
                }
                Incoming::Page(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    tracing::debug!(skipped, "Page events lagged, re-reading store");
                    self.resync();
                }
                Incoming::Storage(Some(ChangeEvent::Changed(change))) => {
                    if let Some(update) = self.on_storage_change(&change) {
                        return Some(update);
                    }
                }
                Incoming::Storage(Some(ChangeEvent::Lagged(skipped))) => {
                    tracing::debug!(skipped, "Storage notifications lagged, re-reading store");
                    self.resync();
                }
                Incoming::Page(Err(broadcast::error::RecvError::Closed))
                | Incoming::Storage(None) => return None,
            }
        }
    }

    fn watches(&self, namespace: Namespace) -> bool {
        self.namespaces.contains(&namespace)
    }

    fn on_page_event(&self, event: PageEvent) -> Option<SyncUpdate> {
        let namespace = event.kind.namespace();
        if !self.accepts(namespace, &event.actor) {
            return None;
        }

        let update = match event.payload {
            Some(EventPayload::Count(count)) => Some(SyncUpdate::Count { namespace, count }),
            Some(EventPayload::Items(items)) => self.decode(namespace, &items),
            None => None,
        };
        Some(update.unwrap_or_else(|| self.snapshot(namespace)))
    }

    fn on_storage_change(&self, change: &StorageChange) -> Option<SyncUpdate> {
        let Some(key) = StorageKey::parse(&change.key) else {
            tracing::trace!(key = %change.key, "Ignoring change to foreign key");
            return None;
        };
        if !self.accepts(key.namespace(), key.actor()) {
            return None;
        }

        let update = change
            .new_value
            .as_deref()
            .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
            .and_then(|value| self.decode(key.namespace(), &value));
        Some(update.unwrap_or_else(|| self.snapshot(key.namespace())))
    }

    fn accepts(&self, namespace: Namespace, actor: &ActorKey) -> bool {
        if !self.watches(namespace) {
            return false;
        }
        let active = self.ctx.actor();
        if actor != &active {
            tracing::trace!(%actor, %active, %namespace, "Dropping event for another actor");
            return false;
        }
        true
    }

    /// Decode an event body, `None` if it is not usable.
    fn decode(&self, namespace: Namespace, value: &Value) -> Option<SyncUpdate> {
        if !value.is_array() && !(namespace == Namespace::Cart && value.is_object()) {
            return None;
        }
        match namespace {
            Namespace::Cart => Some(SyncUpdate::Cart(cart::normalize_cart_with(
                value,
                self.ctx.shipping(),
            ))),
            Namespace::Wishlist => Some(SyncUpdate::Wishlist(wishlist::parse_wishlist(value))),
            Namespace::OrderHistory => Some(SyncUpdate::Orders(orders::parse_history(value))),
            Namespace::PendingOrders => serde_json::from_value(value.clone())
                .ok()
                .map(SyncUpdate::PendingOrders),
        }
    }

    /// Current persisted view of a namespace for the active actor.
    fn snapshot(&self, namespace: Namespace) -> SyncUpdate {
        let actor = self.ctx.actor();
        let store = self.ctx.store();
        match namespace {
            Namespace::Cart => SyncUpdate::Cart(cart::read_state(&self.ctx, &actor)),
            Namespace::Wishlist => SyncUpdate::Wishlist(wishlist::read_items(store, &actor)),
            Namespace::OrderHistory => SyncUpdate::Orders(orders::read_history(store, &actor)),
            Namespace::PendingOrders => {
                SyncUpdate::PendingOrders(orders::read_pending(store, &actor))
            }
        }
    }

    fn resync(&mut self) {
        for namespace in self.namespaces.clone() {
            let update = self.snapshot(namespace);
            self.backlog.push_back(update);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use rust_decimal::Decimal;
    use serde_json::json;

    use super::*;
    use crate::identity::StaticIdentity;
    use crate::store::StorageArea;

    fn tab(area: &StorageArea, identity: &Arc<StaticIdentity>) -> TabContext {
        TabContext::new(area, identity.clone())
    }

    async fn next_now(sub: &mut Subscription) -> Option<SyncUpdate> {
        tokio::time::timeout(Duration::from_millis(50), sub.next())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn test_page_event_with_items_updates_cart() {
        let area = StorageArea::in_memory();
        let identity = Arc::new(StaticIdentity::anonymous());
        let ctx = tab(&area, &identity);
        let mut sub = ctx.subscribe(&[Namespace::Cart]);

        let items = vec![CartItem::new("1", "Mug", Decimal::TEN).with_quantity(2)];
        ctx.bus().publish(PageEvent::cart_updated(ActorKey::guest(), &items));

        let Some(SyncUpdate::Cart(cart)) = next_now(&mut sub).await else {
            panic!("expected cart update");
        };
        assert_eq!(cart.grand_total(), Decimal::from(20));
    }

    #[tokio::test]
    async fn test_missing_payload_falls_back_to_store() {
        let area = StorageArea::in_memory();
        let identity = Arc::new(StaticIdentity::anonymous());
        let ctx = tab(&area, &identity);
        ctx.store()
            .write(
                Namespace::Cart,
                &ActorKey::guest(),
                &json!([{"id": 5, "price": 3, "quantity": 3}]),
            )
            .unwrap();
        let mut sub = ctx.subscribe(&[Namespace::Cart]);

        ctx.bus().publish(PageEvent {
            kind: PageEventKind::CartUpdated,
            actor: ActorKey::guest(),
            payload: Some(EventPayload::Items(json!("garbage"))),
        });

        let Some(SyncUpdate::Cart(cart)) = next_now(&mut sub).await else {
            panic!("expected cart update");
        };
        assert_eq!(cart.subtotal(), Decimal::from(9));
    }

    #[tokio::test]
    async fn test_other_actor_and_namespace_are_ignored() {
        let area = StorageArea::in_memory();
        let identity = Arc::new(StaticIdentity::with_record(r#"{"id": "a"}"#));
        let ctx = tab(&area, &identity);
        let mut sub = ctx.subscribe(&[Namespace::Cart]);

        ctx.bus()
            .publish(PageEvent::cart_updated(ActorKey::new("b"), &[]));
        ctx.bus()
            .publish(PageEvent::wishlist_updated(ActorKey::new("a"), 3));

        assert!(next_now(&mut sub).await.is_none());
    }

    #[tokio::test]
    async fn test_count_payload_is_passed_through() {
        let area = StorageArea::in_memory();
        let identity = Arc::new(StaticIdentity::anonymous());
        let ctx = tab(&area, &identity);
        let mut sub = ctx.subscribe(&[Namespace::Wishlist]);

        ctx.bus()
            .publish(PageEvent::wishlist_updated(ActorKey::guest(), 4));

        assert_eq!(
            next_now(&mut sub).await,
            Some(SyncUpdate::Count {
                namespace: Namespace::Wishlist,
                count: 4
            })
        );
    }

    #[tokio::test]
    async fn test_storage_change_from_other_tab() {
        let area = StorageArea::in_memory();
        let identity = Arc::new(StaticIdentity::anonymous());
        let tab_a = tab(&area, &identity);
        let tab_b = tab(&area, &identity);
        let mut sub_b = tab_b.subscribe(&[Namespace::Cart]);
        let mut sub_a = tab_a.subscribe(&[Namespace::Cart]);

        tab_a
            .store()
            .write(
                Namespace::Cart,
                &ActorKey::guest(),
                &json!([{"id": 1, "price": 2}]),
            )
            .unwrap();

        let Some(SyncUpdate::Cart(cart)) = next_now(&mut sub_b).await else {
            panic!("expected cart update in other tab");
        };
        assert_eq!(cart.subtotal(), Decimal::TWO);
        // The writer does not hear its own storage write.
        assert!(next_now(&mut sub_a).await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_storage_value_falls_back_to_store() {
        let area = StorageArea::in_memory();
        let identity = Arc::new(StaticIdentity::anonymous());
        let tab_b = tab(&area, &identity);
        let mut sub = tab_b.subscribe(&[Namespace::OrderHistory]);

        let change = StorageChange {
            key: "orders_guest".to_string(),
            new_value: Some("{truncated".to_string()),
            source: tab(&area, &identity).store().tab_id(),
        };
        assert_eq!(
            sub.on_storage_change(&change),
            Some(SyncUpdate::Orders(Vec::new()))
        );
    }
}
