//! Invoice totals engine.
//!
//! All arithmetic is decimal. Line totals and the subtotal are exact;
//! tax and discount are rounded to cents (midpoint away from zero) when
//! computed, and the grand total is the exact sum of the three parts, so
//! `total == subtotal + tax_amount - discount_amount` always holds.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::{MAX_RATE_PERCENT, MAX_RATE_SCALE, MONEY_SCALE};
use crate::errors::{AppError, AppResult};

/// Round a monetary amount to cents.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// `quantity × unit_price`
pub fn item_total(quantity: Decimal, unit_price: Decimal) -> Decimal {
    quantity * unit_price
}

/// Sum of line totals.
pub fn subtotal<I>(lines: I) -> Decimal
where
    I: IntoIterator<Item = (Decimal, Decimal)>,
{
    lines
        .into_iter()
        .map(|(quantity, price)| item_total(quantity, price))
        .sum()
}

fn percentage_of(amount: Decimal, rate: Decimal) -> Decimal {
    round_money(amount * rate / Decimal::ONE_HUNDRED)
}

/// `subtotal × tax_rate / 100`, rounded to cents.
pub fn tax_amount(subtotal: Decimal, tax_rate: Decimal) -> Decimal {
    percentage_of(subtotal, tax_rate)
}

/// `subtotal × discount_rate / 100`, rounded to cents.
pub fn discount_amount(subtotal: Decimal, discount_rate: Decimal) -> Decimal {
    percentage_of(subtotal, discount_rate)
}

pub fn grand_total(subtotal: Decimal, tax_amount: Decimal, discount_amount: Decimal) -> Decimal {
    subtotal + tax_amount - discount_amount
}

/// Significant decimal places, ignoring trailing zeros.
pub fn significant_scale(value: Decimal) -> u32 {
    value.normalize().scale()
}

/// Check that a percentage lies in `[0, 100]` with at most four decimals.
pub fn validate_rate(name: &str, rate: Decimal) -> AppResult<()> {
    if rate < Decimal::ZERO || rate > Decimal::from(MAX_RATE_PERCENT) {
        return Err(AppError::validation(format!(
            "{} must be between 0 and {}",
            name, MAX_RATE_PERCENT
        )));
    }
    if significant_scale(rate) > MAX_RATE_SCALE {
        return Err(AppError::validation(format!(
            "{} allows at most {} decimal places",
            name, MAX_RATE_SCALE
        )));
    }
    Ok(())
}

/// Computed monetary totals of an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub struct Totals {
    #[schema(value_type = String, example = "25")]
    pub subtotal: Decimal,
    #[schema(value_type = String, example = "2.50")]
    pub tax_amount: Decimal,
    #[schema(value_type = String, example = "0.00")]
    pub discount_amount: Decimal,
    #[schema(value_type = String, example = "27.50")]
    pub total: Decimal,
}

impl Totals {
    /// Compute all totals from `(quantity, unit_price)` lines and rates.
    pub fn compute<I>(lines: I, tax_rate: Decimal, discount_rate: Decimal) -> Self
    where
        I: IntoIterator<Item = (Decimal, Decimal)>,
    {
        let subtotal = subtotal(lines);
        let tax_amount = tax_amount(subtotal, tax_rate);
        let discount_amount = discount_amount(subtotal, discount_rate);

        Self {
            subtotal,
            tax_amount,
            discount_amount,
            total: grand_total(subtotal, tax_amount, discount_amount),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reference_invoice() {
        let totals = Totals::compute(
            vec![(dec!(2), dec!(10)), (dec!(1), dec!(5))],
            dec!(10),
            dec!(0),
        );

        assert_eq!(totals.subtotal, dec!(25));
        assert_eq!(totals.tax_amount, dec!(2.5));
        assert_eq!(totals.discount_amount, dec!(0));
        assert_eq!(totals.total, dec!(27.5));
    }

    #[test]
    fn test_subtotal_is_exact_sum_of_products() {
        let lines = vec![
            (dec!(0.333), dec!(1.10)),
            (dec!(3), dec!(19.99)),
            (dec!(1.5), dec!(0.07)),
        ];
        let expected: Decimal = lines.iter().map(|(q, p)| q * p).sum();

        assert_eq!(subtotal(lines), expected);
    }

    #[test]
    fn test_total_identity_over_rate_grid() {
        let lines = vec![(dec!(3), dec!(33.33)), (dec!(0.5), dec!(12.01))];

        for tax in [dec!(0), dec!(7.25), dec!(19), dec!(100)] {
            for discount in [dec!(0), dec!(2.5), dec!(15), dec!(100)] {
                let t = Totals::compute(lines.clone(), tax, discount);
                assert_eq!(t.total, t.subtotal + t.tax_amount - t.discount_amount);
            }
        }
    }

    #[test]
    fn test_rounding_midpoint_away_from_zero() {
        // 0.125 -> 0.13
        assert_eq!(tax_amount(dec!(1.25), dec!(10)), dec!(0.13));
        assert_eq!(round_money(dec!(2.345)), dec!(2.35));
        assert_eq!(round_money(dec!(2.344)), dec!(2.34));
    }

    #[test]
    fn test_empty_invoice() {
        let totals = Totals::compute(Vec::new(), dec!(20), dec!(5));
        assert_eq!(totals, Totals::default());
    }

    #[test]
    fn test_validate_rate_bounds() {
        assert!(validate_rate("tax_rate", dec!(0)).is_ok());
        assert!(validate_rate("tax_rate", dec!(100)).is_ok());
        assert!(validate_rate("tax_rate", dec!(-0.01)).is_err());
        assert!(validate_rate("tax_rate", dec!(100.01)).is_err());
    }

    #[test]
    fn test_validate_rate_scale() {
        assert!(validate_rate("tax_rate", dec!(7.1234)).is_ok());
        assert!(validate_rate("tax_rate", dec!(7.123400)).is_ok());
        assert!(validate_rate("tax_rate", dec!(7.12345)).is_err());
    }
}
