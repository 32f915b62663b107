//! Order reconciliation.
//!
//! Submitting an order is local-first: the order is persisted as pending
//! before the backend is asked to confirm it, so nothing the user placed is
//! ever lost to a network failure. Exactly one confirmation attempt is made;
//! whatever happens, the order is then recorded in the actor's history.

mod history;
mod remote;
mod types;

pub use history::{MergeOutcome, merge_update, reconcile_fetched};
pub use remote::{
    ConfirmError, FetchError, HistoryFetcher, HttpConfirmer, HttpHistoryFetcher, OrderConfirmer,
};
pub use types::{CheckoutPayload, ConfirmationRequest, OrderHistoryEntry, PendingOrder};

use std::sync::Arc;

use cartsync_core::{ActorKey, LocalOrderId};
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::instrument;

use crate::bus::PageEvent;
use crate::context::TabContext;
use crate::store::{KeyedStore, Namespace, StoreError};

/// Errors surfaced by order submission.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The order could not be recorded locally.
    #[error("failed to record pending order: {0}")]
    Persist(#[from] StoreError),
}

/// Parse a history list, dropping entries without a usable id.
///
/// Accepts a bare array or an object with an `orders` array.
#[must_use]
pub fn parse_history(raw: &Value) -> Vec<OrderHistoryEntry> {
    let entries = raw
        .as_array()
        .or_else(|| raw.get("orders").and_then(Value::as_array));
    entries
        .map(|entries| {
            entries
                .iter()
                .cloned()
                .filter_map(OrderHistoryEntry::from_json)
                .collect()
        })
        .unwrap_or_default()
}

/// Read the persisted order history of `actor`, newest first.
#[must_use]
pub fn read_history(store: &KeyedStore, actor: &ActorKey) -> Vec<OrderHistoryEntry> {
    let raw: Value = store.read(Namespace::OrderHistory, actor);
    parse_history(&raw)
}

/// Read the pending orders of `actor`, oldest first.
///
/// Unreadable entries are skipped rather than discarding the whole list.
#[must_use]
pub fn read_pending(store: &KeyedStore, actor: &ActorKey) -> Vec<PendingOrder> {
    let raw: Vec<Value> = store.read(Namespace::PendingOrders, actor);
    raw.into_iter()
        .filter_map(|entry| match serde_json::from_value(entry) {
            Ok(order) => Some(order),
            Err(e) => {
                tracing::warn!(%actor, error = %e, "Skipping unreadable pending order");
                None
            }
        })
        .collect()
}

/// Persist a history list and announce it to the tab's fragments.
pub(crate) fn write_history(
    ctx: &TabContext,
    actor: &ActorKey,
    history: &[OrderHistoryEntry],
) -> Result<(), StoreError> {
    ctx.store().write(Namespace::OrderHistory, actor, history)?;
    ctx.bus()
        .publish(PageEvent::orders_updated(actor.clone(), history));
    Ok(())
}

/// Local id for a new order: the clock, but strictly after every pending id.
fn next_local_id(pending: &[PendingOrder], now: DateTime<Utc>) -> LocalOrderId {
    let candidate = LocalOrderId::from_millis(now.timestamp_millis());
    match pending.iter().map(|order| order.local_id).max() {
        Some(newest) if newest >= candidate => newest.successor(),
        _ => candidate,
    }
}

/// Submits orders for the actor signed in to a tab.
#[derive(Clone)]
pub struct OrderClient {
    ctx: TabContext,
    confirmer: Arc<dyn OrderConfirmer>,
}

impl OrderClient {
    #[must_use]
    pub fn new(ctx: TabContext, confirmer: Arc<dyn OrderConfirmer>) -> Self {
        Self { ctx, confirmer }
    }

    /// Place an order.
    ///
    /// The order is stored as pending, confirmed once with the backend and
    /// appended to the history. A failed confirmation or history write is
    /// logged and does not fail the call; the pending record stays as
    /// evidence. The actor is resolved once, so a sign-out during the
    /// confirmation does not move the order to another actor.
    ///
    /// # Errors
    ///
    /// Returns an error only if the pending order could not be persisted.
    #[instrument(skip(self, payload), fields(actor = tracing::field::Empty, local_id = tracing::field::Empty))]
    pub async fn submit_order(&self, payload: CheckoutPayload) -> Result<LocalOrderId, OrderError> {
        let actor = self.ctx.actor();
        let store = self.ctx.store();
        let span = tracing::Span::current();
        span.record("actor", tracing::field::display(&actor));

        let created_at = Utc::now();
        let mut pending = read_pending(store, &actor);
        let local_id = next_local_id(&pending, created_at);
        span.record("local_id", local_id.as_i64());

        pending.push(PendingOrder {
            local_id,
            created_at,
            payload: payload.clone(),
        });
        store.write(Namespace::PendingOrders, &actor, &pending)?;
        self.ctx
            .bus()
            .publish(PageEvent::pending_orders_updated(actor.clone(), &pending));
        tracing::info!("Order recorded as pending");

        let request = ConfirmationRequest {
            local_id,
            payload: &payload,
        };
        let ack = match self.confirmer.confirm(&request).await {
            Ok(ack) => {
                tracing::info!("Order confirmed");
                Some(ack)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Order confirmation failed, keeping pending record");
                None
            }
        };

        let entry = OrderHistoryEntry::placed(local_id, created_at, &payload, ack.as_ref());
        // Re-read: pushes may have changed the history during the confirmation.
        let mut history = read_history(store, &actor);
        history.insert(0, entry);
        if let Err(e) = write_history(&self.ctx, &actor, &history) {
            tracing::error!(error = %e, "Failed to append order to history");
        }

        Ok(local_id)
    }

    /// Pending orders of the active actor.
    #[must_use]
    pub fn pending_orders(&self) -> Vec<PendingOrder> {
        read_pending(self.ctx.store(), &self.ctx.actor())
    }

    /// Order history of the active actor, newest first.
    #[must_use]
    pub fn history(&self) -> Vec<OrderHistoryEntry> {
        read_history(self.ctx.store(), &self.ctx.actor())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use cartsync_core::OrderStatus;
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::*;
    use crate::bus::SyncUpdate;
    use crate::identity::StaticIdentity;
    use crate::store::StorageArea;

    struct FakeConfirmer {
        response: Result<Value, u16>,
        seen: Mutex<Vec<Value>>,
    }

    impl FakeConfirmer {
        fn answering(response: Result<Value, u16>) -> Arc<Self> {
            Arc::new(Self {
                response,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl OrderConfirmer for FakeConfirmer {
        async fn confirm(&self, request: &ConfirmationRequest<'_>) -> Result<Value, ConfirmError> {
            self.seen
                .lock()
                .unwrap()
                .push(serde_json::to_value(request).unwrap());
            match &self.response {
                Ok(ack) => Ok(ack.clone()),
                Err(status) => Err(ConfirmError::Api {
                    status: *status,
                    message: "unavailable".to_string(),
                }),
            }
        }
    }

    fn payload() -> CheckoutPayload {
        CheckoutPayload {
            shipping_address: json!({"line1": "1 Main St"}),
            items: vec![json!({"id": 1, "quantity": 1, "price": "30"})],
            delivery_method: "standard".to_string(),
            payment_method: "cod".to_string(),
            payment: None,
            coupon: None,
            total: Decimal::from(30),
        }
    }

    fn client(confirmer: Arc<FakeConfirmer>) -> OrderClient {
        let area = StorageArea::in_memory();
        let ctx = TabContext::new(&area, Arc::new(StaticIdentity::with_record(r#"{"id": 42}"#)));
        OrderClient::new(ctx, confirmer)
    }

    #[tokio::test]
    async fn test_failed_confirmation_still_records_order() {
        let confirmer = FakeConfirmer::answering(Err(503));
        let orders = client(confirmer.clone());

        let local_id = orders.submit_order(payload()).await.unwrap();

        let pending = orders.pending_orders();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].local_id, local_id);

        let history = orders.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id().unwrap().as_str(), local_id.to_string());
        assert_eq!(history[0].status(), OrderStatus::Pending);
        assert_eq!(history[0].total(), Some(Decimal::from(30)));

        let seen = confirmer.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["local_id"], json!(local_id.as_i64()));
    }

    #[tokio::test]
    async fn test_confirmed_order_takes_server_id() {
        let orders = client(FakeConfirmer::answering(Ok(json!({"id": "SO-1", "status": "paid"}))));
        let local_id = orders.submit_order(payload()).await.unwrap();

        let history = orders.history();
        assert_eq!(history[0].id().unwrap().as_str(), "SO-1");
        assert_eq!(history[0].local_id(), Some(local_id));
        assert_eq!(history[0].status(), OrderStatus::Paid);
        // Pending records are kept even after confirmation.
        assert_eq!(orders.pending_orders().len(), 1);
    }

    #[tokio::test]
    async fn test_history_is_newest_first_with_increasing_ids() {
        let orders = client(FakeConfirmer::answering(Ok(Value::Null)));
        let first = orders.submit_order(payload()).await.unwrap();
        let second = orders.submit_order(payload()).await.unwrap();

        assert!(second > first);
        let ids: Vec<_> = orders.history().iter().filter_map(OrderHistoryEntry::local_id).collect();
        assert_eq!(ids, vec![second, first]);
    }

    #[tokio::test]
    async fn test_submitting_tab_sees_its_pending_orders() {
        let orders = client(FakeConfirmer::answering(Err(500)));
        let mut pending_view = orders.ctx.subscribe(&[Namespace::PendingOrders]);

        let local_id = orders.submit_order(payload()).await.unwrap();

        let update = tokio::time::timeout(std::time::Duration::from_millis(50), pending_view.next())
            .await
            .unwrap();
        let Some(SyncUpdate::PendingOrders(pending)) = update else {
            panic!("expected pending orders, got {update:?}");
        };
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].local_id, local_id);
    }

    #[test]
    fn test_local_id_is_strictly_monotonic() {
        let now = Utc.timestamp_millis_opt(1_000).unwrap();
        let pending = vec![PendingOrder {
            local_id: LocalOrderId::from_millis(5_000),
            created_at: now,
            payload: payload(),
        }];
        assert_eq!(next_local_id(&pending, now), LocalOrderId::from_millis(5_001));
        assert_eq!(next_local_id(&[], now), LocalOrderId::from_millis(1_000));
    }

    #[test]
    fn test_parse_history_accepts_wrapped_list() {
        let history = parse_history(&json!({"orders": [{"id": 1}, {"no": "id"}, "x"]}));
        assert_eq!(history.len(), 1);
        assert!(parse_history(&json!("garbage")).is_empty());
    }
}
