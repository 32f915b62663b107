//! Wishlist commands.

use cartsync_client::ClientError;
use cartsync_client::wishlist::{Wishlist, WishlistItem};
use cartsync_core::{LineId, format_amount};
use rust_decimal::Decimal;

use super::{CommandError, Session};

pub fn show(session: &Session) {
    print_wishlist(&Wishlist::new(session.ctx.clone()).items());
}

pub fn add(session: &Session, id: String, title: String, price: Decimal) -> Result<(), CommandError> {
    let items = Wishlist::new(session.ctx.clone())
        .add(WishlistItem::new(id, title, price))
        .map_err(ClientError::from)?;
    print_wishlist(&items);
    Ok(())
}

pub fn remove(session: &Session, id: &str) -> Result<(), CommandError> {
    let items = Wishlist::new(session.ctx.clone())
        .remove(&LineId::new(id))
        .map_err(ClientError::from)?;
    print_wishlist(&items);
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_wishlist(items: &[WishlistItem]) {
    if items.is_empty() {
        println!("Wishlist is empty");
        return;
    }
    for item in items {
        println!(
            "{:<12} {:<28} {:>10}",
            item.id,
            item.title,
            format_amount(item.unit_price)
        );
    }
}
