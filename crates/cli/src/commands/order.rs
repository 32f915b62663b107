//! Order commands.

use std::path::Path;
use std::sync::Arc;

use cartsync_client::ClientError;
use cartsync_client::orders::{
    self, CheckoutPayload, HttpConfirmer, OrderClient, OrderHistoryEntry, PendingOrder,
};
use cartsync_core::format_amount;

use super::{CommandError, Session};

/// Place an order from a JSON checkout payload.
///
/// # Errors
///
/// Returns an error if the payload cannot be read, no origin is configured,
/// or the pending order cannot be recorded. A failed confirmation is not an
/// error: the order stays pending.
pub async fn submit(session: &Session, payload: &Path) -> Result<(), CommandError> {
    let raw = std::fs::read_to_string(payload).map_err(|source| CommandError::ReadFile {
        path: payload.to_path_buf(),
        source,
    })?;
    let payload: CheckoutPayload = serde_json::from_str(&raw)?;

    let origin = session.config.require_origin().map_err(ClientError::from)?;
    let confirmer = HttpConfirmer::new(origin, session.config.api_token.clone())
        .map_err(ClientError::from)?;
    let client = OrderClient::new(session.ctx.clone(), Arc::new(confirmer));

    let local_id = client
        .submit_order(payload)
        .await
        .map_err(ClientError::from)?;

    #[allow(clippy::print_stdout)]
    {
        println!("Order placed (local id {local_id})");
    }
    if let Some(entry) = client.history().first() {
        print_entries(std::slice::from_ref(entry));
    }
    Ok(())
}

/// Print the order history, newest first.
pub fn history(session: &Session) {
    let ctx = &session.ctx;
    print_entries(&orders::read_history(ctx.store(), &ctx.actor()));
}

/// Print orders recorded locally as pending.
#[allow(clippy::print_stdout)]
pub fn pending(session: &Session) {
    let ctx = &session.ctx;
    let pending = orders::read_pending(ctx.store(), &ctx.actor());
    if pending.is_empty() {
        println!("No pending orders");
    }
    for PendingOrder {
        local_id,
        created_at,
        payload,
    } in &pending
    {
        println!(
            "{local_id:<16} {:<25} {:>10} {} item(s)",
            created_at.to_rfc3339(),
            format_amount(payload.total),
            payload.items.len()
        );
    }
}

#[allow(clippy::print_stdout)]
pub fn print_entries(entries: &[OrderHistoryEntry]) {
    if entries.is_empty() {
        println!("No orders");
        return;
    }
    for entry in entries {
        let id = entry.id().map(|id| id.to_string()).unwrap_or_default();
        let total = entry.total().map(format_amount).unwrap_or_default();
        let created = entry
            .created_at()
            .map(|at| at.to_rfc3339())
            .unwrap_or_default();
        println!(
            "{id:<16} {:<12} {total:>10} {} item(s) {created}",
            entry.status().as_str(),
            entry.items().len()
        );
    }
}
