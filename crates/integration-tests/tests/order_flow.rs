//! Local-first order submission.

#![allow(clippy::unwrap_used)]

use cartsync_client::bus::SyncUpdate;
use cartsync_client::orders::{self, CheckoutPayload, OrderClient};
use cartsync_client::store::Namespace;
use cartsync_core::OrderStatus;
use cartsync_integration_tests::{Browser, RecordingConfirmer, next_update};
use rust_decimal::Decimal;
use serde_json::json;

const ALICE: &str = r#"{"id": 17}"#;

fn checkout(total: i64) -> CheckoutPayload {
    serde_json::from_value(json!({
        "shipping_address": {"name": "Alice", "line1": "1 Main St", "city": "Springfield"},
        "items": [{"id": "mug", "quantity": 2, "price": "12.50"}],
        "delivery_method": "standard",
        "payment_method": "card",
        "payment": {"last4": "4242"},
        "coupon": null,
        "total": total.to_string(),
    }))
    .unwrap()
}

#[tokio::test]
async fn test_order_survives_confirmation_failure() {
    let browser = Browser::in_memory();
    let tab = browser.open_tab(Some(ALICE));
    let confirmer = RecordingConfirmer::failing(500);
    let client = OrderClient::new(tab.ctx.clone(), confirmer.clone());

    let local_id = client.submit_order(checkout(25)).await.unwrap();

    let pending = client.pending_orders();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].local_id, local_id);
    assert_eq!(pending[0].payload.total, Decimal::from(25));

    let history = client.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].local_id(), Some(local_id));
    assert_eq!(history[0].status(), OrderStatus::Pending);

    let requests = confirmer.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["local_id"], json!(local_id.as_i64()));
    assert_eq!(requests[0]["payment"]["last4"], json!("4242"));
}

#[tokio::test]
async fn test_retry_after_failure_creates_two_records() {
    let browser = Browser::in_memory();
    let tab = browser.open_tab(Some(ALICE));
    let client = OrderClient::new(tab.ctx.clone(), RecordingConfirmer::failing(504));

    let first = client.submit_order(checkout(25)).await.unwrap();
    let second = client.submit_order(checkout(25)).await.unwrap();

    assert_ne!(first, second);
    assert_eq!(client.pending_orders().len(), 2);
    assert_eq!(client.history().len(), 2);
}

#[tokio::test]
async fn test_other_tabs_see_new_orders() {
    let browser = Browser::in_memory();
    let checkout_tab = browser.open_tab(Some(ALICE));
    let account_tab = browser.open_tab(Some(ALICE));
    let mut order_list = account_tab.subscribe(&[Namespace::OrderHistory]);
    let mut own_list = checkout_tab.subscribe(&[Namespace::OrderHistory]);

    let client = OrderClient::new(
        checkout_tab.ctx.clone(),
        RecordingConfirmer::accepting(json!({"order": {"id": 5001, "status": "paid"}})),
    );
    client.submit_order(checkout(40)).await.unwrap();

    for subscription in [&mut order_list, &mut own_list] {
        let Some(SyncUpdate::Orders(history)) = next_update(subscription).await else {
            panic!("order list should update");
        };
        assert_eq!(history[0].id().unwrap().as_str(), "5001");
        assert_eq!(history[0].status(), OrderStatus::Paid);
    }
}

#[tokio::test]
async fn test_orders_stay_with_the_actor_who_placed_them() {
    let browser = Browser::in_memory();
    let tab = browser.open_tab(Some(ALICE));
    let client = OrderClient::new(tab.ctx.clone(), RecordingConfirmer::accepting(json!({})));
    let alice = tab.actor();

    client.submit_order(checkout(10)).await.unwrap();
    tab.sign_out();

    assert!(client.history().is_empty());
    assert!(client.pending_orders().is_empty());
    assert_eq!(orders::read_history(tab.ctx.store(), &alice).len(), 1);
}

#[tokio::test]
async fn test_guest_orders_are_recorded() {
    let browser = Browser::in_memory();
    let tab = browser.open_tab(None);
    let client = OrderClient::new(tab.ctx.clone(), RecordingConfirmer::accepting(json!(null)));

    client.submit_order(checkout(10)).await.unwrap();

    assert!(tab.actor().is_guest());
    assert_eq!(client.history().len(), 1);
}
