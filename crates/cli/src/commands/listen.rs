//! Follow live order updates.

use std::sync::Arc;

use cartsync_client::ClientError;
use cartsync_client::bus::SyncUpdate;
use cartsync_client::live::{LiveOrderReceiver, SseTransport};
use cartsync_client::orders::HttpHistoryFetcher;
use cartsync_client::store::Namespace;

use super::order::print_entries;
use super::{CommandError, Session};

/// Run the live receiver until Ctrl+C, printing the history after each change.
///
/// # Errors
///
/// Returns an error if no origin is configured or the HTTP clients cannot be
/// built. Channel failures are retried, never returned.
pub async fn run(session: &Session) -> Result<(), CommandError> {
    let config = &session.config;
    let origin = config.require_origin().map_err(ClientError::from)?;
    let transport = SseTransport::new(config.api_token.clone()).map_err(ClientError::from)?;
    let fetcher =
        HttpHistoryFetcher::new(origin, config.api_token.clone()).map_err(ClientError::from)?;

    let receiver = LiveOrderReceiver::new(
        session.ctx.clone(),
        origin.clone(),
        Arc::new(transport),
        Arc::new(fetcher),
    )
    .with_reconnect_delay(config.reconnect_delay);

    let Some(handle) = receiver.spawn() else {
        tracing::warn!("Guests have no live order channel; pass --identity");
        return Ok(());
    };
    tracing::info!(actor = %session.ctx.actor(), "Listening for order updates, Ctrl+C to stop");

    let mut updates = session.ctx.subscribe(&[Namespace::OrderHistory]);
    loop {
        tokio::select! {
            update = updates.next() => match update {
                Some(SyncUpdate::Orders(history)) => print_entries(&history),
                Some(_) => {}
                None => break,
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                }
                break;
            }
        }
    }

    handle.shutdown().await;
    tracing::info!("Stopped listening");
    Ok(())
}
