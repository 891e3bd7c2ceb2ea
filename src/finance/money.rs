//! Money arithmetic
//!
//! Amounts are rounded to cents with midpoint-away-from-zero, so 0.125
//! becomes 0.13 rather than banker's 0.12.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::types::{IbError, Result};

pub fn round2(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Rounded `quantity x unit_price`
pub fn line_amount(quantity: Decimal, unit_price: Decimal) -> Decimal {
    round2(quantity * unit_price)
}

/// Rounded tax on an amount at a percentage rate
pub fn tax_on(amount: Decimal, rate_percent: Decimal) -> Decimal {
    round2(amount * rate_percent / Decimal::ONE_HUNDRED)
}

pub fn ensure_positive(field: &str, amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(IbError::Validation(format!("{field} must be greater than zero")));
    }
    Ok(())
}

pub fn ensure_non_negative(field: &str, amount: Decimal) -> Result<()> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(IbError::Validation(format!("{field} must not be negative")));
    }
    Ok(())
}

/// Three-letter ISO currency code, uppercased
pub fn normalize_currency(code: &str) -> Result<String> {
    let code = code.trim().to_uppercase();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(IbError::Validation(format!("'{code}' is not a currency code")));
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_midpoint_rounds_away_from_zero() {
        assert_eq!(round2(dec!(0.125)), dec!(0.13));
        assert_eq!(round2(dec!(0.135)), dec!(0.14));
        assert_eq!(round2(dec!(-0.125)), dec!(-0.13));
        assert_eq!(round2(dec!(10.004)), dec!(10.00));
    }

    #[test]
    fn test_tax() {
        assert_eq!(line_amount(dec!(3), dec!(19.99)), dec!(59.97));
        assert_eq!(tax_on(dec!(59.97), dec!(18)), dec!(10.79));
        assert_eq!(tax_on(dec!(100), dec!(0)), dec!(0));
    }

    #[test]
    fn test_currency() {
        assert_eq!(normalize_currency(" usd ").unwrap(), "USD");
        assert!(normalize_currency("US").is_err());
        assert!(normalize_currency("U$D").is_err());
    }
}
