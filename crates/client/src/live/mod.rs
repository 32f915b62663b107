//! Live order updates.
//!
//! A signed-in actor gets one push channel. Every message is merged into the
//! actor's order history, which is then persisted and announced like any
//! other write. The channel is an enhancement only: while it is down the tab
//! keeps working from stored state, and the receiver reconnects after a fixed
//! delay for as long as it runs.

mod envelope;
mod sse;

pub use envelope::{PushEnvelope, PushKind};
pub use sse::SseTransport;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cartsync_core::ActorKey;
use futures::StreamExt;
use futures::stream::BoxStream;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::instrument;
use url::Url;

use crate::context::TabContext;
use crate::orders::{self, HistoryFetcher, MergeOutcome};
use crate::origin::Origin;

/// Default pause between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Push channel failures. All of them end in a reconnect.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("push channel refused ({0})")]
    Status(u16),

    #[error("push channel closed")]
    Closed,

    #[error("push event larger than {0} bytes")]
    EventTooLarge(usize),
}

/// Raw messages of one open channel.
pub type PushStream = BoxStream<'static, Result<String, ChannelError>>;

/// Opens push channels.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<PushStream, ChannelError>;
}

/// Push channel URL of an actor: `{origin}/events/orders/{actor}`.
#[must_use]
pub fn channel_url(origin: &Origin, actor: &ActorKey) -> Url {
    origin.endpoint(&["events", "orders", actor.as_str()])
}

/// What handling one message did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// The order was merged into the history.
    Merged(MergeOutcome),
    /// The history was re-fetched and reconciled.
    Refetched,
    /// The re-fetch failed; history is unchanged.
    RefetchFailed,
    /// The message was unusable or carried no order id.
    Ignored,
}

/// Merges pushed order events into the history of the signed-in actor.
#[derive(Clone)]
pub struct LiveOrderReceiver {
    ctx: TabContext,
    origin: Origin,
    transport: Arc<dyn PushTransport>,
    fetcher: Arc<dyn HistoryFetcher>,
    reconnect_delay: Duration,
}

impl LiveOrderReceiver {
    #[must_use]
    pub fn new(
        ctx: TabContext,
        origin: Origin,
        transport: Arc<dyn PushTransport>,
        fetcher: Arc<dyn HistoryFetcher>,
    ) -> Self {
        Self {
            ctx,
            origin,
            transport,
            fetcher,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    #[must_use]
    pub const fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Start receiving in a background task.
    ///
    /// Returns `None` for guests, who have no push channel. Dropping the
    /// returned handle stops the receiver as well.
    #[must_use]
    pub fn spawn(self) -> Option<LiveHandle> {
        let actor = self.ctx.actor();
        if actor.is_guest() {
            tracing::debug!("Guest session, not opening a push channel");
            return None;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        Some(LiveHandle {
            shutdown: shutdown_tx,
            task,
        })
    }

    /// Apply one raw push message to the active actor's history.
    pub async fn handle_message(&self, raw: &str) -> MessageOutcome {
        self.apply(&self.ctx.actor(), raw).await
    }

    #[instrument(skip(self, actor, raw), fields(actor = %actor))]
    async fn apply(&self, actor: &ActorKey, raw: &str) -> MessageOutcome {
        let Some(envelope) = PushEnvelope::parse(raw) else {
            tracing::debug!("Ignoring malformed push message");
            return MessageOutcome::Ignored;
        };

        if envelope.kind == PushKind::OrderCreated {
            return self.refetch(actor).await;
        }

        let mut history = orders::read_history(self.ctx.store(), actor);
        let outcome = orders::merge_update(&mut history, envelope.order);
        if outcome == MergeOutcome::Ignored {
            tracing::debug!("Ignoring push message without order id");
            return MessageOutcome::Ignored;
        }
        if let Err(e) = orders::write_history(&self.ctx, actor, &history) {
            tracing::error!(error = %e, "Failed to persist pushed order update");
        }
        MessageOutcome::Merged(outcome)
    }

    async fn refetch(&self, actor: &ActorKey) -> MessageOutcome {
        match self.fetcher.fetch_history(actor).await {
            Ok(fetched) => {
                // Read after the fetch so local writes made meanwhile survive.
                let local = orders::read_history(self.ctx.store(), actor);
                let history = orders::reconcile_fetched(local, fetched);
                if let Err(e) = orders::write_history(&self.ctx, actor, &history) {
                    tracing::error!(error = %e, "Failed to persist fetched order history");
                }
                tracing::debug!(count = history.len(), "Order history re-fetched");
                MessageOutcome::Refetched
            }
            Err(e) => {
                tracing::warn!(error = %e, "Order history re-fetch failed, keeping local history");
                MessageOutcome::RefetchFailed
            }
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let actor = self.ctx.actor();
            if actor.is_guest() {
                tracing::info!("Signed out, closing push channel");
                return;
            }
            let url = channel_url(&self.origin, &actor);

            let connected = tokio::select! {
                result = self.transport.connect(&url) => result,
                _ = shutdown.changed() => return,
            };

            match connected {
                Ok(mut stream) => {
                    tracing::info!(%actor, "Push channel open");
                    if self.pump(&actor, &mut stream, &mut shutdown).await.is_break() {
                        return;
                    }
                }
                Err(e) => tracing::warn!(%actor, error = %e, "Push channel connect failed"),
            }

            tracing::debug!(delay = ?self.reconnect_delay, "Reconnecting push channel");
            tokio::select! {
                () = tokio::time::sleep(self.reconnect_delay) => {}
                _ = shutdown.changed() => return,
            }
        }
    }

    /// Read one connection until it drops, the actor changes or shutdown.
    async fn pump(
        &self,
        actor: &ActorKey,
        stream: &mut PushStream,
        shutdown: &mut watch::Receiver<bool>,
    ) -> std::ops::ControlFlow<()> {
        use std::ops::ControlFlow;

        loop {
            let message = tokio::select! {
                message = stream.next() => message,
                _ = shutdown.changed() => return ControlFlow::Break(()),
            };

            match message {
                Some(Ok(raw)) => {
                    if &self.ctx.actor() != actor {
                        tracing::info!(%actor, "Actor changed, dropping push channel");
                        return ControlFlow::Continue(());
                    }
                    self.apply(actor, &raw).await;
                }
                Some(Err(e)) => {
                    tracing::warn!(%actor, error = %e, "Push channel failed");
                    return ControlFlow::Continue(());
                }
                None => {
                    tracing::warn!(%actor, error = %ChannelError::Closed, "Push channel dropped");
                    return ControlFlow::Continue(());
                }
            }
        }
    }
}

/// Handle to a running receiver.
#[derive(Debug)]
pub struct LiveHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl LiveHandle {
    /// Stop the receiver and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Live order receiver task failed");
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
