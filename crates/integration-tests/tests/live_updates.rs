//! Pushed order events.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use cartsync_client::bus::SyncUpdate;
use cartsync_client::live::{LiveOrderReceiver, MessageOutcome};
use cartsync_client::orders::{CheckoutPayload, MergeOutcome, OrderClient};
use cartsync_client::origin::Origin;
use cartsync_client::store::Namespace;
use cartsync_integration_tests::{
    Browser, FakeHistoryServer, FakePushServer, RecordingConfirmer, Tab, next_update,
};
use serde_json::json;

const ALICE: &str = r#"{"email": "alice@example.com"}"#;

fn receiver(tab: &Tab, push: &Arc<FakePushServer>, server: &Arc<FakeHistoryServer>) -> LiveOrderReceiver {
    LiveOrderReceiver::new(
        tab.ctx.clone(),
        Origin::parse("https://shop.example.com").unwrap(),
        push.clone(),
        server.clone(),
    )
    .with_reconnect_delay(Duration::from_secs(3))
}

async fn place_order(tab: &Tab, ack: serde_json::Value) {
    let payload: CheckoutPayload = serde_json::from_value(json!({
        "shipping_address": {"line1": "1 Main St"},
        "items": [{"id": "mug", "quantity": 1}],
        "delivery_method": "express",
        "payment_method": "card",
        "total": "30",
    }))
    .unwrap();
    OrderClient::new(tab.ctx.clone(), RecordingConfirmer::accepting(ack))
        .submit_order(payload)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_status_update_merges_into_placed_order() {
    let browser = Browser::in_memory();
    let tab = browser.open_tab(Some(ALICE));
    place_order(&tab, json!({"id": 7})).await;
    let live = receiver(&tab, &Arc::default(), &Arc::default());

    let outcome = live
        .handle_message(r#"{"type":"order_update","order":{"id":7,"status":"paid"}}"#)
        .await;

    assert_eq!(outcome, MessageOutcome::Merged(MergeOutcome::Updated));
    let history = cartsync_client::orders::read_history(tab.ctx.store(), &tab.actor());
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].get("status"), Some(&json!("paid")));
    assert_eq!(history[0].get("total"), Some(&json!("30")));
    assert_eq!(history[0].get("delivery_method"), Some(&json!("express")));
}

#[tokio::test]
async fn test_order_created_reconciles_without_losing_local_orders() {
    let browser = Browser::in_memory();
    let tab = browser.open_tab(Some(ALICE));
    // Confirmation failed: the server never heard of this local order.
    place_order(&tab, json!(null)).await;
    let server = Arc::new(FakeHistoryServer::default());
    server.serve(vec![json!({"id": "SO-9", "status": "processing", "total": "12"})]);
    let live = receiver(&tab, &Arc::default(), &server);

    let outcome = live
        .handle_message(r#"{"type":"order_created","order":{"id":"SO-9"}}"#)
        .await;

    assert_eq!(outcome, MessageOutcome::Refetched);
    assert_eq!(server.fetches(), 1);
    let history = cartsync_client::orders::read_history(tab.ctx.store(), &tab.actor());
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id().unwrap().as_str(), "SO-9");
    assert!(history[1].local_id().is_some());
}

#[tokio::test]
async fn test_refetch_failure_keeps_history() {
    let browser = Browser::in_memory();
    let tab = browser.open_tab(Some(ALICE));
    place_order(&tab, json!({"id": 1})).await;
    let server = Arc::new(FakeHistoryServer::default());
    server.go_down();
    let live = receiver(&tab, &Arc::default(), &server);

    assert_eq!(
        live.handle_message(r#"{"type":"order_created"}"#).await,
        MessageOutcome::RefetchFailed
    );
    assert_eq!(
        cartsync_client::orders::read_history(tab.ctx.store(), &tab.actor()).len(),
        1
    );
}

#[tokio::test]
async fn test_guest_has_no_channel() {
    let browser = Browser::in_memory();
    let tab = browser.open_tab(None);
    let push = Arc::new(FakePushServer::default());

    assert!(receiver(&tab, &push, &Arc::default()).spawn().is_none());
    assert!(push.attempts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_pushed_updates_reach_other_tabs_and_survive_reconnects() {
    let browser = Browser::in_memory();
    let listening_tab = browser.open_tab(Some(ALICE));
    let other_tab = browser.open_tab(Some(ALICE));
    place_order(&listening_tab, json!({"id": 7})).await;

    let push = Arc::new(FakePushServer::default());
    let first = push.accept_next();
    let handle = receiver(&listening_tab, &push, &Arc::default())
        .spawn()
        .unwrap();
    let mut other_view = other_tab.subscribe(&[Namespace::OrderHistory]);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(
        push.attempts()[0].as_str(),
        "https://shop.example.com/events/orders/alice@example.com"
    );

    first
        .send(Ok(r#"{"type":"order_update","order":{"id":7,"status":"shipped"}}"#.to_string()))
        .unwrap();
    let Some(SyncUpdate::Orders(history)) = next_update(&mut other_view).await else {
        panic!("other tab should see the pushed status");
    };
    assert_eq!(history[0].get("status"), Some(&json!("shipped")));

    // Drop the connection; the receiver reconnects after the fixed delay.
    let second = push.accept_next();
    drop(first);
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(push.attempts().len(), 2);

    second
        .send(Ok(r#"{"type":"order_update","order":{"id":8,"status":"paid"}}"#.to_string()))
        .unwrap();
    let Some(SyncUpdate::Orders(history)) = next_update(&mut other_view).await else {
        panic!("other tab should see the new order");
    };
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].get("id"), Some(&json!(8)));

    handle.shutdown().await;
}
