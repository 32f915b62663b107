//! Shopping cart.
//!
//! The cart is persisted per actor as a list of raw items and rebuilt through
//! [`normalize_cart_with`] on every read. Mutations are write-through: the new
//! items are committed to the store, then `cart_updated` is published to the
//! tab's own fragments. Other tabs learn about the change from the storage
//! notification.

mod normalize;

pub use normalize::{
    CartItem, CartLine, CartState, FIELD_MAP, FieldMap, ShippingPolicy, normalize_cart,
    normalize_cart_with, parse_items,
};

use cartsync_core::{ActorKey, LineId};
use serde_json::Value;
use tracing::instrument;

use crate::bus::PageEvent;
use crate::context::TabContext;
use crate::store::{Namespace, StoreError};

/// Read the persisted cart of `actor`.
#[must_use]
pub fn read_state(ctx: &TabContext, actor: &ActorKey) -> CartState {
    let raw: Value = ctx.store().read(Namespace::Cart, actor);
    normalize_cart_with(&raw, ctx.shipping())
}

/// Cart operations for the actor signed in to a tab.
#[derive(Clone)]
pub struct Cart {
    ctx: TabContext,
}

impl Cart {
    #[must_use]
    pub const fn new(ctx: TabContext) -> Self {
        Self { ctx }
    }

    /// Current cart of the active actor.
    #[must_use]
    pub fn state(&self) -> CartState {
        read_state(&self.ctx, &self.ctx.actor())
    }

    /// Add a line, or increase the quantity of an existing line with the same id.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart could not be persisted.
    #[instrument(skip(self, item), fields(line_id = %item.id))]
    pub fn add_line(&self, item: CartItem) -> Result<CartState, StoreError> {
        let actor = self.ctx.actor();
        let mut items = read_state(&self.ctx, &actor).to_items();
        let quantity = item.quantity.max(1);

        match items.iter_mut().find(|existing| existing.id == item.id) {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(quantity),
            None => items.push(item.with_quantity(quantity)),
        }
        self.commit(&actor, items)
    }

    /// Set the quantity of a line.
    ///
    /// Quantities below 1 and unknown ids leave the cart untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart could not be persisted.
    #[instrument(skip(self), fields(line_id = %id))]
    pub fn update_qty(&self, id: &LineId, quantity: i64) -> Result<CartState, StoreError> {
        let actor = self.ctx.actor();
        let state = read_state(&self.ctx, &actor);
        let Ok(quantity) = u32::try_from(quantity) else {
            tracing::debug!(quantity, "Ignoring out-of-range quantity");
            return Ok(state);
        };
        if quantity < 1 || state.line(id).is_none() {
            tracing::debug!(quantity, "Ignoring quantity update");
            return Ok(state);
        }

        let mut items = state.to_items();
        for item in &mut items {
            if &item.id == id {
                item.quantity = quantity;
            }
        }
        self.commit(&actor, items)
    }

    /// Remove a line. Unknown ids leave the cart untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart could not be persisted.
    #[instrument(skip(self), fields(line_id = %id))]
    pub fn remove_line(&self, id: &LineId) -> Result<CartState, StoreError> {
        let actor = self.ctx.actor();
        let state = read_state(&self.ctx, &actor);
        if state.line(id).is_none() {
            return Ok(state);
        }

        let items = state
            .to_items()
            .into_iter()
            .filter(|item| &item.id != id)
            .collect();
        self.commit(&actor, items)
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart could not be persisted.
    #[instrument(skip(self))]
    pub fn clear(&self) -> Result<CartState, StoreError> {
        let actor = self.ctx.actor();
        self.commit(&actor, Vec::new())
    }

    fn commit(&self, actor: &ActorKey, items: Vec<CartItem>) -> Result<CartState, StoreError> {
        self.ctx.store().write(Namespace::Cart, actor, &items)?;
        self.ctx
            .bus()
            .publish(PageEvent::cart_updated(actor.clone(), &items));
        let state = CartState::from_items(items, self.ctx.shipping());
        tracing::debug!(%actor, count = state.item_count(), "Cart updated");
        Ok(state)
    }
}
