// Line amount and total arithmetic.
//
// Amounts are rounded to a whole currency unit, half away from zero.
// Overflow is reported as `None` instead of panicking.

use rust_decimal::{Decimal, RoundingStrategy};

/// `unit_price * qty` rounded to a whole currency unit.
pub fn line_amount(unit_price: Decimal, qty: Decimal) -> Option<Decimal> {
    unit_price
        .checked_mul(qty)
        .map(|raw| raw.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
}

/// Sum of already-rounded amounts.
pub fn sum_amounts<I>(amounts: I) -> Option<Decimal>
where
    I: IntoIterator<Item = Decimal>,
{
    amounts.into_iter().try_fold(Decimal::ZERO, Decimal::checked_add)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(line_amount(dec("2.5"), dec("1")), Some(dec("3")));
        assert_eq!(line_amount(dec("1.49"), dec("1")), Some(dec("1")));
        assert_eq!(line_amount(dec("-2.5"), dec("1")), Some(dec("-3")));
    }

    #[test]
    fn multiplies_fractional_quantities() {
        assert_eq!(line_amount(dec("1200"), dec("0.75")), Some(dec("900")));
        assert_eq!(line_amount(dec("33.33"), dec("3")), Some(dec("100")));
    }

    #[test]
    fn overflow_is_none() {
        assert_eq!(line_amount(Decimal::MAX, dec("2")), None);
        assert_eq!(sum_amounts([Decimal::MAX, Decimal::ONE]), None);
    }

    #[test]
    fn empty_sum_is_zero() {
        assert_eq!(sum_amounts(std::iter::empty()), Some(Decimal::ZERO));
    }
}
