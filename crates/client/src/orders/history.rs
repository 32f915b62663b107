//! Order history merging.
//!
//! History is append-only from the client's point of view: entries are
//! added or field-merged by id, never removed.

use std::collections::HashSet;

use cartsync_core::OrderKey;
use serde_json::{Map, Value};

use super::OrderHistoryEntry;

/// What a merge did to the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// An existing entry was updated in place.
    Updated,
    /// No entry had the id; a new one was put first.
    Prepended,
    /// The update carried no usable id.
    Ignored,
}

/// Merge one pushed order record into the history.
pub fn merge_update(history: &mut Vec<OrderHistoryEntry>, update: Map<String, Value>) -> MergeOutcome {
    let Some(id) = update.get("id").and_then(OrderKey::from_json) else {
        return MergeOutcome::Ignored;
    };

    if let Some(existing) = history
        .iter_mut()
        .find(|entry| entry.id().as_ref() == Some(&id))
    {
        existing.merge(&update);
        return MergeOutcome::Updated;
    }

    match OrderHistoryEntry::from_fields(update) {
        Some(entry) => {
            history.insert(0, entry);
            MergeOutcome::Prepended
        }
        None => MergeOutcome::Ignored,
    }
}

/// Reconcile local history with an authoritative server list.
///
/// Server entries come first, in server order, each merged over the local
/// entry with the same id so locally known fields survive. Local entries the
/// server did not return follow in their existing order.
#[must_use]
pub fn reconcile_fetched(
    local: Vec<OrderHistoryEntry>,
    fetched: Vec<OrderHistoryEntry>,
) -> Vec<OrderHistoryEntry> {
    let fetched_ids: HashSet<OrderKey> = fetched.iter().filter_map(OrderHistoryEntry::id).collect();
    let (mut matched, unmatched): (Vec<_>, Vec<_>) = local
        .into_iter()
        .partition(|entry| entry.id().is_some_and(|id| fetched_ids.contains(&id)));

    let mut reconciled = Vec::with_capacity(fetched.len() + unmatched.len());
    let mut seen = HashSet::new();
    for server_entry in fetched {
        let Some(id) = server_entry.id() else {
            continue;
        };
        if !seen.insert(id.clone()) {
            continue;
        }
        let entry = match matched
            .iter()
            .position(|entry| entry.id().as_ref() == Some(&id))
        {
            Some(index) => {
                let mut local_entry = matched.swap_remove(index);
                local_entry.merge(server_entry.fields());
                local_entry
            }
            None => server_entry,
        };
        reconciled.push(entry);
    }
    reconciled.extend(unmatched);
    reconciled
}
