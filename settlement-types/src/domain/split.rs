//! Merchant / dividend split of a gross deposit.
//!
//! The merchant share is rounded down and the dividend share rounded up, so
//! any sub-micro remainder always lands in the dividend pool and the two
//! parts never sum to less than the gross amount.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::amount::{AMOUNT_SCALE, Amount};
use crate::error::DomainError;

/// Validated pair of split ratios that sum to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitRatios {
    merchant: Decimal,
    dividend: Decimal,
}

impl SplitRatios {
    pub fn new(merchant: Decimal, dividend: Decimal) -> Result<Self, DomainError> {
        let unit = Decimal::ZERO..=Decimal::ONE;
        if !unit.contains(&merchant) || !unit.contains(&dividend) {
            return Err(DomainError::InvalidRatio(format!(
                "ratios must lie in [0, 1], got {merchant} / {dividend}"
            )));
        }
        if merchant + dividend != Decimal::ONE {
            return Err(DomainError::InvalidRatio(format!(
                "ratios must sum to 1, got {merchant} + {dividend}"
            )));
        }
        Ok(Self { merchant, dividend })
    }

    pub fn merchant(&self) -> Decimal {
        self.merchant
    }

    pub fn dividend(&self) -> Decimal {
        self.dividend
    }
}

impl Default for SplitRatios {
    /// 95% to the merchant, 5% to the dividend pool.
    fn default() -> Self {
        Self {
            merchant: Decimal::new(95, 2),
            dividend: Decimal::new(5, 2),
        }
    }
}

/// Result of splitting a gross amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub gross: Amount,
    pub merchant_amount: Amount,
    pub dividend_amount: Amount,
}

/// Splits `gross` into merchant and dividend parts.
///
/// Postcondition: `gross <= merchant + dividend <= gross + 0.000001`.
pub fn split(gross: Amount, ratios: &SplitRatios) -> Result<Split, DomainError> {
    let gross_dec = gross.to_decimal();

    let merchant = (gross_dec * ratios.merchant)
        .round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::ToNegativeInfinity);
    let dividend = (gross_dec * ratios.dividend)
        .round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::ToPositiveInfinity);

    let merchant_amount = Amount::from_decimal(merchant)?;
    let dividend_amount = Amount::from_decimal(dividend)?;

    let total = merchant_amount.checked_add(dividend_amount)?;
    if total.micros() < gross.micros() || total.micros() > gross.micros() + 1 {
        return Err(DomainError::SplitInvariant {
            gross: gross.to_string(),
            merchant: merchant_amount.to_string(),
            dividend: dividend_amount.to_string(),
        });
    }

    Ok(Split {
        gross,
        merchant_amount,
        dividend_amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn amount(s: &str) -> Amount {
        s.parse().unwrap()
    }

    #[test]
    fn test_even_split() {
        let result = split(amount("10.000000"), &SplitRatios::default()).unwrap();

        assert_eq!(result.merchant_amount, amount("9.500000"));
        assert_eq!(result.dividend_amount, amount("0.500000"));
        assert_eq!(
            result
                .merchant_amount
                .checked_add(result.dividend_amount)
                .unwrap(),
            amount("10.000000")
        );
    }

    #[test]
    fn test_remainder_goes_to_dividend() {
        let gross = amount("10.000001");
        let result = split(gross, &SplitRatios::default()).unwrap();

        assert_eq!(result.merchant_amount, amount("9.500000"));
        assert_eq!(result.dividend_amount, amount("0.500001"));

        let total = result
            .merchant_amount
            .checked_add(result.dividend_amount)
            .unwrap();
        assert!(total >= gross);
        assert!(total.micros() <= gross.micros() + 1);
    }

    #[test]
    fn test_merchant_never_rounds_up() {
        let ratios = SplitRatios::new(dec!(0.333333), dec!(0.666667)).unwrap();
        for micros in [1_i64, 7, 999_999, 1_234_567, 10_000_001] {
            let gross = Amount::from_micros(micros).unwrap();
            let result = split(gross, &ratios).unwrap();
            let exact = gross.to_decimal() * ratios.merchant();
            assert!(result.merchant_amount.to_decimal() <= exact);
        }
    }

    #[test]
    fn test_zero_gross() {
        let result = split(Amount::zero(), &SplitRatios::default()).unwrap();
        assert!(result.merchant_amount.is_zero());
        assert!(result.dividend_amount.is_zero());
    }

    #[test]
    fn test_ratios_must_sum_to_one() {
        assert!(matches!(
            SplitRatios::new(dec!(0.9), dec!(0.05)),
            Err(DomainError::InvalidRatio(_))
        ));
        assert!(matches!(
            SplitRatios::new(dec!(1.05), dec!(-0.05)),
            Err(DomainError::InvalidRatio(_))
        ));
    }
}
