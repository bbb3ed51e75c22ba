//! Fixed-point monetary amount with six decimal places.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Number of decimal places carried by every amount.
pub const AMOUNT_SCALE: u32 = 6;

const MICROS_PER_UNIT: i64 = 1_000_000;

/// Non-negative amount stored as an integer count of micro-units (10^-6).
///
/// Serialized as a decimal string (`"10.500000"`) so no precision is lost on
/// the wire. Deserialization accepts strings or numbers but rejects anything
/// with more than six decimal places rather than rounding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(i64);

impl Amount {
    /// Creates an amount from micro-units.
    pub fn from_micros(micros: i64) -> Result<Self, DomainError> {
        if micros < 0 {
            return Err(DomainError::NegativeAmount);
        }
        Ok(Self(micros))
    }

    /// The zero amount.
    pub fn zero() -> Self {
        Self(0)
    }

    /// Creates an amount from a decimal without rounding.
    pub fn from_decimal(value: Decimal) -> Result<Self, DomainError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(DomainError::NegativeAmount);
        }
        let normalized = value.normalize();
        if normalized.scale() > AMOUNT_SCALE {
            return Err(DomainError::ExcessPrecision(value.to_string()));
        }
        let micros = normalized
            .checked_mul(Decimal::from(MICROS_PER_UNIT))
            .ok_or(DomainError::AmountOverflow)?
            .trunc()
            .try_into()
            .map_err(|_| DomainError::AmountOverflow)?;
        Ok(Self(micros))
    }

    /// Returns the amount in micro-units.
    pub fn micros(&self) -> i64 {
        self.0
    }

    /// Returns the amount as a decimal with exactly six decimal places.
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0, AMOUNT_SCALE)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition.
    pub fn checked_add(&self, other: Amount) -> Result<Amount, DomainError> {
        self.0
            .checked_add(other.0)
            .map(Amount)
            .ok_or(DomainError::AmountOverflow)
    }

    /// Sums a sequence of amounts, failing on overflow.
    pub fn sum<'a>(amounts: impl IntoIterator<Item = &'a Amount>) -> Result<Amount, DomainError> {
        amounts
            .into_iter()
            .try_fold(Amount::zero(), |acc, a| acc.checked_add(*a))
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Amount::from_decimal(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.to_decimal()
    }
}

impl FromStr for Amount {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim())
            .map_err(|e| DomainError::ValidationError(format!("invalid amount {s:?}: {e}")))?;
        Amount::from_decimal(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:06}",
            self.0 / MICROS_PER_UNIT,
            self.0 % MICROS_PER_UNIT
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_from_decimal() {
        let amount = Amount::from_decimal(dec!(10.5)).unwrap();
        assert_eq!(amount.micros(), 10_500_000);
        assert_eq!(amount.to_string(), "10.500000");
    }

    #[test]
    fn test_excess_precision_rejected() {
        let result = Amount::from_decimal(dec!(1.0000001));
        assert!(matches!(result, Err(DomainError::ExcessPrecision(_))));
    }

    #[test]
    fn test_trailing_zeros_are_not_precision() {
        let amount = Amount::from_decimal(dec!(2.50000000)).unwrap();
        assert_eq!(amount.micros(), 2_500_000);
    }

    #[test]
    fn test_negative_amount_fails() {
        assert!(matches!(
            Amount::from_micros(-1),
            Err(DomainError::NegativeAmount)
        ));
        assert!(matches!(
            Amount::from_decimal(dec!(-0.5)),
            Err(DomainError::NegativeAmount)
        ));
    }

    #[test]
    fn test_parse_and_display() {
        let amount: Amount = "0.000001".parse().unwrap();
        assert_eq!(amount.micros(), 1);
        assert_eq!(amount.to_string(), "0.000001");
    }

    #[test]
    fn test_serde_uses_decimal_strings() {
        let amount = Amount::from_micros(3_141_592).unwrap();
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "\"3.141592\"");

        let parsed: Amount = serde_json::from_str("\"3.141592\"").unwrap();
        assert_eq!(parsed, amount);
        assert!(serde_json::from_str::<Amount>("\"1.23456789\"").is_err());
    }

    #[test]
    fn test_huge_amount_overflows_without_panicking() {
        assert!(matches!(
            Amount::from_decimal(Decimal::MAX),
            Err(DomainError::AmountOverflow)
        ));
        assert!(matches!(
            Amount::from_decimal(dec!(100000000000000000000000)),
            Err(DomainError::AmountOverflow)
        ));
        assert!(serde_json::from_str::<Amount>("\"100000000000000000000000\"").is_err());
        assert!(serde_json::from_str::<Amount>("\"10000000000000\"").is_err());
    }

    #[test]
    fn test_sum() {
        let amounts = [
            Amount::from_micros(1).unwrap(),
            Amount::from_micros(2).unwrap(),
        ];
        assert_eq!(Amount::sum(&amounts).unwrap().micros(), 3);
        assert!(Amount::sum(&[Amount(i64::MAX), Amount(1)]).is_err());
    }
}
