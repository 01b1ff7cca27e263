//! Precision-safe numeric types for trading.
//!
//! Prices use `rust_decimal` so that target levels computed from
//! fractional multipliers (0.5×, 1.5× risk) compare exactly against
//! quoted prices; floating-point drift would move trigger points.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// Quoted prices are normalised to paise precision.
pub const PRICE_DP: u32 = 2;

/// Price with exact decimal precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(pub Decimal);

impl Price {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Convert a wire `f32` last-traded price, rounded to [`PRICE_DP`].
    ///
    /// Returns `None` for NaN/infinite values.
    pub fn from_wire_f32(value: f32) -> Option<Self> {
        Decimal::from_f32(value).map(|d| Self(d.round_dp(PRICE_DP)))
    }

    /// Convert a JSON `f64` quote, rounded to [`PRICE_DP`].
    pub fn from_wire_f64(value: f64) -> Option<Self> {
        Decimal::from_f64(value).map(|d| Self(d.round_dp(PRICE_DP)))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl FromStr for Price {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let value: Decimal = s.trim().parse()?;
        if value.is_sign_negative() {
            return Err(CoreError::InvalidPrice(s.to_string()));
        }
        Ok(Self(value))
    }
}

impl From<Decimal> for Price {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

impl Add<Decimal> for Price {
    type Output = Self;

    fn add(self, rhs: Decimal) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl Sub<Decimal> for Price {
    type Output = Self;

    fn sub(self, rhs: Decimal) -> Self::Output {
        Self(self.0 - rhs)
    }
}

impl Sub for Price {
    type Output = Decimal;

    fn sub(self, rhs: Self) -> Self::Output {
        self.0 - rhs.0
    }
}

/// Order quantity in lots/shares. Always a positive integer, including
/// when read back from storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    /// Create a quantity, rejecting zero.
    pub fn new(value: u32) -> Result<Self> {
        if value == 0 {
            return Err(CoreError::InvalidQuantity("quantity must be positive".to_string()));
        }
        Ok(Self(value))
    }

    #[inline]
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for Quantity {
    type Error = CoreError;

    fn try_from(value: u32) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Quantity> for u32 {
    fn from(qty: Quantity) -> Self {
        qty.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_wire_f32_rounds_to_paise() {
        let price = Price::from_wire_f32(24_150.35).unwrap();
        assert_eq!(price.inner(), dec!(24150.35));

        assert!(Price::from_wire_f32(f32::NAN).is_none());
    }

    #[test]
    fn test_price_parse_rejects_negative() {
        assert_eq!("101.5".parse::<Price>().unwrap().inner(), dec!(101.5));
        assert!("-3".parse::<Price>().is_err());
        assert!("abc".parse::<Price>().is_err());
    }

    #[test]
    fn test_display_is_normalized() {
        assert_eq!(Price::new(dec!(110.00)).to_string(), "110");
        assert_eq!(Price::new(dec!(97.50)).to_string(), "97.5");
    }

    #[test]
    fn test_quantity_rejects_zero() {
        assert!(Quantity::new(0).is_err());
        assert_eq!(Quantity::new(50).unwrap().get(), 50);
    }

    #[test]
    fn test_stored_zero_quantity_is_rejected() {
        let qty: Quantity = serde_json::from_str("25").unwrap();
        assert_eq!(qty.get(), 25);
        assert_eq!(serde_json::to_string(&qty).unwrap(), "25");

        assert!(serde_json::from_str::<Quantity>("0").is_err());
    }
}
