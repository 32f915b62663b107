//! Cart commands.

use cartsync_client::ClientError;
use cartsync_client::cart::{Cart, CartItem, CartState};
use cartsync_core::{LineId, format_amount};
use rust_decimal::Decimal;

use super::{CommandError, Session};

fn cart(session: &Session) -> Cart {
    Cart::new(session.ctx.clone())
}

/// Print the cart of the active actor.
pub fn show(session: &Session) {
    print_cart(&cart(session).state());
}

/// Add a product to the cart.
pub fn add(
    session: &Session,
    id: String,
    title: String,
    price: Decimal,
    qty: u32,
) -> Result<(), CommandError> {
    let item = CartItem::new(id, title, price).with_quantity(qty);
    let state = cart(session).add_line(item).map_err(ClientError::from)?;
    print_cart(&state);
    Ok(())
}

/// Set the quantity of a line. Quantities below 1 are ignored.
pub fn set_qty(session: &Session, id: &str, qty: i64) -> Result<(), CommandError> {
    let state = cart(session)
        .update_qty(&LineId::new(id), qty)
        .map_err(ClientError::from)?;
    print_cart(&state);
    Ok(())
}

/// Remove a line from the cart.
pub fn remove(session: &Session, id: &str) -> Result<(), CommandError> {
    let state = cart(session)
        .remove_line(&LineId::new(id))
        .map_err(ClientError::from)?;
    print_cart(&state);
    Ok(())
}

/// Empty the cart.
pub fn clear(session: &Session) -> Result<(), CommandError> {
    let state = cart(session).clear().map_err(ClientError::from)?;
    print_cart(&state);
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_cart(state: &CartState) {
    if state.is_empty() {
        println!("Cart is empty");
        return;
    }
    for line in state.items() {
        println!(
            "{:<12} {:<28} {:>3} x {:>10} = {:>10}",
            line.id,
            line.title,
            line.quantity,
            format_amount(line.unit_price),
            format_amount(line.subtotal)
        );
    }
    println!("{:>60}", format!("Subtotal {}", format_amount(state.subtotal())));
    println!("{:>60}", format!("Shipping {}", format_amount(state.shipping())));
    println!("{:>60}", format!("Total {}", format_amount(state.grand_total())));
}
