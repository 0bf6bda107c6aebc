//! Decimal money value object.

use std::iter::Sum;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// A non-currency-tagged monetary amount with two decimal places.
///
/// Amounts are kept as exact decimals; there is a single currency in the
/// system so no currency code travels with the value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Number of decimal places kept for every amount.
    pub const SCALE: u32 = 2;

    /// Creates a money amount, rounding to two decimal places.
    pub fn new(amount: Decimal) -> Self {
        Self(amount.round_dp(Self::SCALE))
    }

    /// Creates a money amount from minor units (cents).
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, Self::SCALE))
    }

    /// Largest amount a stored total or price can hold (`NUMERIC(12, 2)`).
    pub fn max_stored() -> Self {
        Self::from_cents(999_999_999_999)
    }

    /// Returns zero money.
    pub const fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Returns the decimal amount.
    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Returns the amount in minor units, truncating any sub-cent remainder.
    ///
    /// Returns `None` if the amount does not fit in an `i64`.
    pub fn to_minor_units(&self) -> Option<i64> {
        (self.0 * Decimal::ONE_HUNDRED).trunc().to_i64()
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Multiplies by a quantity.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money(self.0 * Decimal::from(quantity))
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s).map(Money::new)
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Money::new(amount)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_from_cents() {
        let money = Money::from_cents(1234);
        assert_eq!(money.amount(), dec!(12.34));
        assert_eq!(money.to_string(), "12.34");
    }

    #[test]
    fn test_money_rounds_to_two_places() {
        assert_eq!(Money::new(dec!(1.005)).amount(), dec!(1.00));
        assert_eq!(Money::new(dec!(2.5)).to_string(), "2.50");
    }

    #[test]
    fn test_line_totals_sum_exactly() {
        let total: Money = [
            Money::new(dec!(99.99)).multiply(2),
            Money::new(dec!(49.99)).multiply(1),
        ]
        .into_iter()
        .sum();
        assert_eq!(total.amount(), dec!(249.97));
    }

    #[test]
    fn test_minor_units_truncate() {
        assert_eq!(Money::new(dec!(249.97)).to_minor_units(), Some(24997));
        assert_eq!(Money::zero().to_minor_units(), Some(0));
    }

    #[test]
    fn test_money_parse_and_serialize() {
        let money: Money = "10.5".parse().unwrap();
        assert_eq!(money.to_string(), "10.50");
        let json = serde_json::to_string(&Money::from_cents(999)).unwrap();
        assert_eq!(json, "\"9.99\"");
    }

    #[test]
    fn test_money_zero() {
        assert!(Money::zero().is_zero());
        assert!(!Money::from_cents(-1).is_zero());
    }
}
