//! Exact money amounts.
//!
//! Amounts are decimals in the shop's currency (the backend stores them as
//! `numeric`). They are never represented as floats.

use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// A non-negative monetary amount.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Build an amount, rejecting negative values.
    pub fn new(amount: Decimal) -> DomainResult<Self> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(DomainError::validation(format!(
                "amount must not be negative (got {amount})"
            )));
        }
        Ok(Self(amount))
    }

    /// Whole-unit amount (e.g. `Money::from_units(100)`).
    pub fn from_units(units: u64) -> Self {
        Self(Decimal::from(units))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn checked_add(self, other: Money) -> DomainResult<Money> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or(DomainError::Overflow)
    }

    /// Line amount: `self × quantity`.
    pub fn times(self, quantity: u32) -> DomainResult<Money> {
        self.0
            .checked_mul(Decimal::from(quantity))
            .map(Money)
            .ok_or(DomainError::Overflow)
    }

    /// Sum a sequence of amounts.
    pub fn sum<I>(amounts: I) -> DomainResult<Money>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |acc, m| acc.checked_add(m))
    }
}

impl core::fmt::Display for Money {
    /// Two decimal places, as printed on receipts.
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let rounded = self.0.round_dp(2);
        f.pad(&format!("{rounded:.2}"))
    }
}

impl FromStr for Money {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let amount = Decimal::from_str(s.trim())
            .map_err(|e| DomainError::validation(format!("invalid amount '{s}': {e}")))?;
        Money::new(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rejects_negative_amounts() {
        assert!(Money::new(Decimal::new(-1, 0)).is_err());
        assert!(Money::new(Decimal::ZERO).is_ok());
    }

    #[test]
    fn line_amount_and_display() {
        let price: Money = "12.5".parse().unwrap();
        let line = price.times(3).unwrap();
        assert_eq!(line.to_string(), "37.50");
        assert_eq!(Money::from_units(200).to_string(), "200.00");
    }

    #[test]
    fn display_honours_width_and_alignment() {
        assert_eq!(format!("{:>8}", Money::from_units(5)), "    5.00");
        assert_eq!(format!("{:<7}|", Money::from_units(12)), "12.00  |");
    }

    #[test]
    fn deserializes_numbers_and_strings() {
        let a: Money = serde_json::from_str("100").unwrap();
        let b: Money = serde_json::from_str("\"100\"").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, Money::from_units(100));
    }

    proptest! {
        #[test]
        fn sum_matches_integer_sum(values in proptest::collection::vec(0u64..1_000_000, 0..50)) {
            let total = Money::sum(values.iter().copied().map(Money::from_units)).unwrap();
            prop_assert_eq!(total, Money::from_units(values.iter().sum()));
        }
    }
}
