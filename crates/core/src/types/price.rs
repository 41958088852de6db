//! Type-safe price representation using decimal arithmetic.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Errors that can occur when building a [`Price`] or [`CurrencyCode`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// Amount below zero.
    #[error("price cannot be negative")]
    Negative,
    /// More than two decimal places.
    #[error("price cannot have more than 2 decimal places")]
    TooPrecise,
    /// Unknown ISO 4217 code.
    #[error("unsupported currency: {0}")]
    UnsupportedCurrency(String),
    /// Arithmetic across currencies.
    #[error("currency mismatch: {0} vs {1}")]
    CurrencyMismatch(CurrencyCode, CurrencyCode),
    /// Overflow while multiplying or summing.
    #[error("price overflow")]
    Overflow,
    /// Above what a stored amount can hold.
    #[error("amount cannot exceed {}", Price::MAX_AMOUNT)]
    TooLarge,
}

/// A non-negative price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit (e.g., dollars, not cents).
    amount: Decimal,
    /// ISO 4217 currency code.
    currency: CurrencyCode,
}

impl Price {
    /// Largest amount a `NUMERIC(12,2)` column holds.
    pub const MAX_AMOUNT: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 2);

    /// Create a validated price.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Negative`], [`PriceError::TooPrecise`] or
    /// [`PriceError::TooLarge`].
    pub fn new(amount: Decimal, currency: CurrencyCode) -> Result<Self, PriceError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PriceError::Negative);
        }
        if amount.normalize().scale() > 2 {
            return Err(PriceError::TooPrecise);
        }
        if amount > Self::MAX_AMOUNT {
            return Err(PriceError::TooLarge);
        }
        Ok(Self { amount, currency })
    }

    /// A zero amount in the given currency.
    #[must_use]
    pub const fn zero(currency: CurrencyCode) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.amount
    }

    #[must_use]
    pub const fn currency(&self) -> CurrencyCode {
        self.currency
    }

    /// Price of `quantity` units.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Overflow`] if the product does not fit a `Decimal`.
    pub fn times(&self, quantity: u32) -> Result<Self, PriceError> {
        let amount = self
            .amount
            .checked_mul(Decimal::from(quantity))
            .ok_or(PriceError::Overflow)?;
        Ok(Self {
            amount,
            currency: self.currency,
        })
    }

    /// Sum two prices of the same currency.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::CurrencyMismatch`] or [`PriceError::Overflow`].
    pub fn checked_add(&self, other: &Self) -> Result<Self, PriceError> {
        if self.currency != other.currency {
            return Err(PriceError::CurrencyMismatch(self.currency, other.currency));
        }
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or(PriceError::Overflow)?;
        Ok(Self {
            amount,
            currency: self.currency,
        })
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:.2}", self.currency.symbol(), self.amount)
    }
}

/// ISO 4217 currency codes accepted by the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
}

impl CurrencyCode {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
            Self::CAD => "CAD",
            Self::AUD => "AUD",
        }
    }

    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::USD | Self::CAD | Self::AUD => "$",
            Self::EUR => "€",
            Self::GBP => "£",
        }
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = PriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Self::USD),
            "EUR" => Ok(Self::EUR),
            "GBP" => Ok(Self::GBP),
            "CAD" => Ok(Self::CAD),
            "AUD" => Ok(Self::AUD),
            _ => Err(PriceError::UnsupportedCurrency(s.to_owned())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn usd(s: &str) -> Price {
        Price::new(Decimal::from_str(s).unwrap(), CurrencyCode::USD).unwrap()
    }

    #[test]
    fn test_rejects_negative() {
        let result = Price::new(Decimal::from_str("-0.01").unwrap(), CurrencyCode::USD);
        assert_eq!(result, Err(PriceError::Negative));
    }

    #[test]
    fn test_zero_is_allowed() {
        assert!(Price::new(Decimal::ZERO, CurrencyCode::EUR).is_ok());
    }

    #[test]
    fn test_rejects_sub_cent_precision() {
        let result = Price::new(Decimal::from_str("1.005").unwrap(), CurrencyCode::USD);
        assert_eq!(result, Err(PriceError::TooPrecise));
        // Trailing zeros do not count
        assert!(Price::new(Decimal::from_str("1.500").unwrap(), CurrencyCode::USD).is_ok());
    }

    #[test]
    fn test_rejects_amount_beyond_storage() {
        assert_eq!(Price::MAX_AMOUNT.to_string(), "9999999999.99");
        assert!(Price::new(Price::MAX_AMOUNT, CurrencyCode::USD).is_ok());
        assert_eq!(
            Price::new(Decimal::from_str("1000000000000").unwrap(), CurrencyCode::USD),
            Err(PriceError::TooLarge)
        );
    }

    #[test]
    fn test_line_total() {
        let total = usd("10.00").times(3).unwrap();
        assert_eq!(total.amount(), Decimal::from_str("30.00").unwrap());
    }

    #[test]
    fn test_sum_requires_same_currency() {
        let eur = Price::new(Decimal::ONE, CurrencyCode::EUR).unwrap();
        assert_eq!(
            usd("1.00").checked_add(&eur),
            Err(PriceError::CurrencyMismatch(CurrencyCode::USD, CurrencyCode::EUR))
        );
        assert_eq!(
            usd("1.25").checked_add(&usd("2.50")).unwrap().amount(),
            Decimal::from_str("3.75").unwrap()
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(usd("19.9").to_string(), "$19.90");
    }

    #[test]
    fn test_currency_from_str() {
        assert_eq!(CurrencyCode::from_str("gbp").unwrap(), CurrencyCode::GBP);
        assert!(CurrencyCode::from_str("XYZ").is_err());
    }
}
