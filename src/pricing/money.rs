use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Currency precision for every price the service quotes or charges.
pub const MONEY_DP: u32 = 2;

/// Round to 2 decimal places, half away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// `base × multiplier`, rounded.
pub fn apply_multiplier(base: Decimal, multiplier: Decimal) -> Decimal {
    round_money(base * multiplier)
}

/// Amounts are persisted as integer cents. Returns `None` if the rounded
/// amount does not fit in an `i64`.
pub fn to_cents(amount: Decimal) -> Option<i64> {
    (round_money(amount) * Decimal::ONE_HUNDRED).to_i64()
}

pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, MONEY_DP)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn whole_price_times_ten_percent() {
        let surged = apply_multiplier(d("2500"), d("1.10"));
        assert_eq!(surged, d("2750.00"));
        assert_eq!(surged.to_string(), "2750.00");
    }

    #[test]
    fn fractional_product_rounds_down_below_midpoint() {
        // 2549.995 * 1.10 = 2804.9945
        assert_eq!(apply_multiplier(d("2549.995"), d("1.10")), d("2804.99"));
    }

    #[test]
    fn midpoint_rounds_away_from_zero() {
        assert_eq!(round_money(d("0.125")), d("0.13"));
        assert_eq!(round_money(d("0.135")), d("0.14"));
        assert_eq!(round_money(d("-0.125")), d("-0.13"));
    }

    #[test]
    fn cents_conversion() {
        assert_eq!(to_cents(d("2750.00")), Some(275_000));
        assert_eq!(to_cents(d("12.345")), Some(1_235));
        assert_eq!(from_cents(254_999), d("2549.99"));
    }
}
