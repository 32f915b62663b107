//! Integration tests for cartsync.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p cartsync-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `multi_tab` - Several tabs of one profile sharing a store
//! - `order_flow` - Local-first order submission
//! - `live_updates` - Pushed order events and history re-fetch
//!
//! This library holds the shared harness: a simulated browser profile and
//! in-memory fakes for the backend collaborators.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use cartsync_client::bus::{Subscription, SyncUpdate};
use cartsync_client::context::TabContext;
use cartsync_client::identity::StaticIdentity;
use cartsync_client::live::{ChannelError, PushStream, PushTransport};
use cartsync_client::orders::{
    ConfirmError, ConfirmationRequest, FetchError, HistoryFetcher, OrderConfirmer,
    OrderHistoryEntry,
};
use cartsync_client::store::{Namespace, StorageArea};
use cartsync_core::ActorKey;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

/// One browser profile: a durable store shared by its tabs.
pub struct Browser {
    area: StorageArea,
}

impl Browser {
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            area: StorageArea::in_memory(),
        }
    }

    #[must_use]
    pub const fn with_area(area: StorageArea) -> Self {
        Self { area }
    }

    #[must_use]
    pub const fn area(&self) -> &StorageArea {
        &self.area
    }

    /// Open a tab whose session record is `record` (`None` for a guest).
    #[must_use]
    pub fn open_tab(&self, record: Option<&str>) -> Tab {
        let identity = Arc::new(StaticIdentity::anonymous());
        identity.set_record(record.map(str::to_string));
        let ctx = TabContext::new(&self.area, identity.clone());
        Tab { ctx, identity }
    }
}

/// A tab with a switchable identity.
pub struct Tab {
    pub ctx: TabContext,
    pub identity: Arc<StaticIdentity>,
}

impl Tab {
    pub fn sign_in(&self, record: &str) {
        self.identity.set_record(Some(record.to_string()));
    }

    pub fn sign_out(&self) {
        self.identity.set_record(None);
    }

    #[must_use]
    pub fn actor(&self) -> ActorKey {
        self.ctx.actor()
    }

    #[must_use]
    pub fn subscribe(&self, namespaces: &[Namespace]) -> Subscription {
        self.ctx.subscribe(namespaces)
    }
}

/// Wait briefly for the next update; `None` if nothing arrives.
pub async fn next_update(subscription: &mut Subscription) -> Option<SyncUpdate> {
    tokio::time::timeout(Duration::from_millis(100), subscription.next())
        .await
        .ok()
        .flatten()
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Confirmer that records every request and answers with a fixed result.
pub struct RecordingConfirmer {
    answer: Result<Value, u16>,
    requests: Mutex<Vec<Value>>,
}

impl RecordingConfirmer {
    /// Accept every confirmation with `ack` as the response body.
    #[must_use]
    pub fn accepting(ack: Value) -> Arc<Self> {
        Arc::new(Self {
            answer: Ok(ack),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Reject every confirmation with an HTTP status.
    #[must_use]
    pub fn failing(status: u16) -> Arc<Self> {
        Arc::new(Self {
            answer: Err(status),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Request bodies received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<Value> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl OrderConfirmer for RecordingConfirmer {
    async fn confirm(&self, request: &ConfirmationRequest<'_>) -> Result<Value, ConfirmError> {
        lock(&self.requests).push(serde_json::to_value(request).unwrap_or(Value::Null));
        match &self.answer {
            Ok(ack) => Ok(ack.clone()),
            Err(status) => Err(ConfirmError::Api {
                status: *status,
                message: "unavailable".to_string(),
            }),
        }
    }
}

/// History fetcher serving a settable server-side history.
#[derive(Default)]
pub struct FakeHistoryServer {
    orders: Mutex<Option<Vec<Value>>>,
    fetches: AtomicUsize,
}

impl FakeHistoryServer {
    /// Serve `orders` from now on.
    pub fn serve(&self, orders: Vec<Value>) {
        *lock(&self.orders) = Some(orders);
    }

    /// Fail every fetch from now on.
    pub fn go_down(&self) {
        *lock(&self.orders) = None;
    }

    #[must_use]
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HistoryFetcher for FakeHistoryServer {
    async fn fetch_history(&self, _actor: &ActorKey) -> Result<Vec<OrderHistoryEntry>, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let orders = lock(&self.orders).clone().ok_or(FetchError::Api {
            status: 502,
            message: "bad gateway".to_string(),
        })?;
        Ok(orders
            .into_iter()
            .filter_map(OrderHistoryEntry::from_json)
            .collect())
    }
}

/// Push transport whose connections are opened by the test.
#[derive(Default)]
pub struct FakePushServer {
    connections: Mutex<VecDeque<mpsc::UnboundedReceiver<Result<String, ChannelError>>>>,
    urls: Mutex<Vec<Url>>,
}

impl FakePushServer {
    /// Queue a connection for the next connect attempt and return its sender.
    /// Dropping the sender drops the connection.
    pub fn accept_next(&self) -> mpsc::UnboundedSender<Result<String, ChannelError>> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.connections).push_back(rx);
        tx
    }

    /// URLs of every connect attempt so far.
    #[must_use]
    pub fn attempts(&self) -> Vec<Url> {
        lock(&self.urls).clone()
    }
}

#[async_trait]
impl PushTransport for FakePushServer {
    async fn connect(&self, url: &Url) -> Result<PushStream, ChannelError> {
        lock(&self.urls).push(url.clone());
        let rx = lock(&self.connections)
            .pop_front()
            .ok_or(ChannelError::Status(503))?;
        let messages = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|message| (message, rx))
        });
        Ok(messages.boxed())
    }
}
