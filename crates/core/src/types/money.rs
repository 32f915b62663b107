//! Money helpers using decimal arithmetic.
//!
//! Amounts are plain [`Decimal`] values in the store's standard unit
//! (dollars, not cents). Currency is not tracked.

use rust_decimal::{Decimal, RoundingStrategy};

/// Round an amount to whole cents (banker's rounding is not used).
#[must_use]
pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Format an amount for display (e.g., "$19.99").
#[must_use]
pub fn format_amount(amount: Decimal) -> String {
    let rounded = round_cents(amount);
    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("-${:.2}", rounded.abs())
    } else {
        format!("${:.2}", rounded.abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(Decimal::new(25, 0)), "$25.00");
        assert_eq!(format_amount(Decimal::new(1999, 2)), "$19.99");
        assert_eq!(format_amount(Decimal::new(-5, 1)), "-$0.50");
    }

    #[test]
    fn test_round_cents() {
        assert_eq!(round_cents(Decimal::new(10_005, 3)), Decimal::new(1001, 2));
    }
}
