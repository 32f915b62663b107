//! Wishlist.
//!
//! Persisted per actor like the cart. Mutations publish `wishlist_updated`
//! with a bare count, which is all the navigation badge needs; fragments
//! that show the items re-read the store.

use cartsync_core::{ActorKey, LineId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use crate::bus::PageEvent;
use crate::cart::FIELD_MAP;
use crate::context::TabContext;
use crate::store::{KeyedStore, Namespace, StoreError};

/// A saved product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WishlistItem {
    pub id: LineId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    pub unit_price: Decimal,
}

impl WishlistItem {
    #[must_use]
    pub fn new(id: impl Into<LineId>, title: impl Into<String>, unit_price: Decimal) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            thumbnail: None,
            unit_price,
        }
    }

    /// Build an item from any upstream product shape.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        let product = value.as_object()?;
        Some(Self {
            id: FIELD_MAP.id(product)?,
            title: FIELD_MAP.title(product),
            thumbnail: FIELD_MAP.thumbnail(product),
            unit_price: FIELD_MAP.unit_price(product),
        })
    }
}

/// Parse a wishlist, dropping unusable entries and duplicate ids.
#[must_use]
pub fn parse_wishlist(raw: &Value) -> Vec<WishlistItem> {
    let Some(entries) = raw.as_array() else {
        return Vec::new();
    };
    let mut items: Vec<WishlistItem> = Vec::with_capacity(entries.len());
    for item in entries.iter().filter_map(WishlistItem::from_json) {
        if !items.iter().any(|existing| existing.id == item.id) {
            items.push(item);
        }
    }
    items
}

/// Read the persisted wishlist of `actor`.
#[must_use]
pub fn read_items(store: &KeyedStore, actor: &ActorKey) -> Vec<WishlistItem> {
    let raw: Value = store.read(Namespace::Wishlist, actor);
    parse_wishlist(&raw)
}

/// Wishlist operations for the actor signed in to a tab.
#[derive(Clone)]
pub struct Wishlist {
    ctx: TabContext,
}

impl Wishlist {
    #[must_use]
    pub const fn new(ctx: TabContext) -> Self {
        Self { ctx }
    }

    #[must_use]
    pub fn items(&self) -> Vec<WishlistItem> {
        read_items(self.ctx.store(), &self.ctx.actor())
    }

    #[must_use]
    pub fn contains(&self, id: &LineId) -> bool {
        self.items().iter().any(|item| &item.id == id)
    }

    /// Save an item. Already saved ids are left as they are.
    ///
    /// # Errors
    ///
    /// Returns an error if the wishlist could not be persisted.
    #[instrument(skip(self, item), fields(item_id = %item.id))]
    pub fn add(&self, item: WishlistItem) -> Result<Vec<WishlistItem>, StoreError> {
        let actor = self.ctx.actor();
        let mut items = read_items(self.ctx.store(), &actor);
        if items.iter().any(|existing| existing.id == item.id) {
            return Ok(items);
        }
        items.push(item);
        self.commit(&actor, items)
    }

    /// Remove an item. Unknown ids leave the wishlist untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the wishlist could not be persisted.
    #[instrument(skip(self), fields(item_id = %id))]
    pub fn remove(&self, id: &LineId) -> Result<Vec<WishlistItem>, StoreError> {
        let actor = self.ctx.actor();
        let items = read_items(self.ctx.store(), &actor);
        if !items.iter().any(|item| &item.id == id) {
            return Ok(items);
        }
        let items = items.into_iter().filter(|item| &item.id != id).collect();
        self.commit(&actor, items)
    }

    /// Add the item if absent, remove it if present.
    ///
    /// Returns whether the item is saved afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the wishlist could not be persisted.
    pub fn toggle(&self, item: WishlistItem) -> Result<bool, StoreError> {
        if self.contains(&item.id) {
            self.remove(&item.id)?;
            Ok(false)
        } else {
            self.add(item)?;
            Ok(true)
        }
    }

    fn commit(
        &self,
        actor: &ActorKey,
        items: Vec<WishlistItem>,
    ) -> Result<Vec<WishlistItem>, StoreError> {
        self.ctx.store().write(Namespace::Wishlist, actor, &items)?;
        self.ctx
            .bus()
            .publish(PageEvent::wishlist_updated(actor.clone(), items.len()));
        Ok(items)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::identity::StaticIdentity;
    use crate::store::StorageArea;

    fn wishlist() -> Wishlist {
        let area = StorageArea::in_memory();
        Wishlist::new(TabContext::new(
            &area,
            Arc::new(StaticIdentity::with_record(r#"{"id": 3}"#)),
        ))
    }

    #[test]
    fn test_add_is_idempotent() {
        let list = wishlist();
        list.add(WishlistItem::new("a", "A", Decimal::ONE)).unwrap();
        let items = list.add(WishlistItem::new("a", "A", Decimal::ONE)).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_toggle() {
        let list = wishlist();
        let item = WishlistItem::new("a", "A", Decimal::ONE);
        assert!(list.toggle(item.clone()).unwrap());
        assert!(list.contains(&LineId::new("a")));
        assert!(!list.toggle(item).unwrap());
        assert!(list.items().is_empty());
    }

    #[test]
    fn test_parse_tolerates_legacy_shapes() {
        let items = parse_wishlist(&json!([
            {"productId": 9, "name": "Lamp", "price": "19.99"},
            {"id": 9, "title": "dup"},
            {"title": "no id"},
            42,
        ]));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Lamp");
        assert!(parse_wishlist(&json!({"items": []})).is_empty());
    }
}
