//! Lossless decimal numeric type backed by rust_decimal.
//!
//! Balances, prices, sizes and ratios all flow through this type so the
//! margin engine never touches binary floating point.

use rust_decimal::Decimal as RustDecimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Lossless decimal numeric type for account and price arithmetic.
///
/// Serializes to a canonical JSON string so persisted session state and API
/// payloads round-trip exactly. Deserializes from a string only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Decimal(RustDecimal);

impl Serialize for Decimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_canonical_string())
    }
}

impl<'de> Deserialize<'de> for Decimal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        rust_decimal::serde::str::deserialize(deserializer).map(Decimal)
    }
}

impl Decimal {
    pub const ZERO: Decimal = Decimal(RustDecimal::ZERO);
    pub const ONE: Decimal = Decimal(RustDecimal::ONE);
    pub const HUNDRED: Decimal = Decimal(RustDecimal::ONE_HUNDRED);

    /// Create a Decimal from a RustDecimal.
    pub fn new(value: RustDecimal) -> Self {
        Decimal(value)
    }

    /// Parse a Decimal from a string losslessly.
    ///
    /// # Errors
    /// Returns an error if the string is not a valid decimal number.
    pub fn from_str_canonical(s: &str) -> Result<Self, rust_decimal::Error> {
        RustDecimal::from_str(s.trim()).map(Decimal)
    }

    /// Format the Decimal as a canonical string (no exponent, no trailing zeros).
    pub fn to_canonical_string(&self) -> String {
        format!("{}", self.0.normalize())
    }

    /// Get the underlying RustDecimal.
    pub fn inner(&self) -> RustDecimal {
        self.0
    }

    pub fn zero() -> Self {
        Self::ZERO
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the value is > 0.
    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.0.is_sign_positive()
    }

    /// Returns true if the value is < 0.
    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.0.is_sign_negative()
    }

    pub fn abs(&self) -> Self {
        Decimal(self.0.abs())
    }

    /// Division that yields `None` on a zero divisor or overflow instead of panicking.
    pub fn checked_div(self, rhs: Decimal) -> Option<Decimal> {
        self.0.checked_div(rhs.0).map(Decimal)
    }

    /// Interpret `self` as a percent and return the plain fraction (`10` -> `0.1`).
    pub fn percent_to_fraction(self) -> Decimal {
        Decimal(self.0 / RustDecimal::ONE_HUNDRED)
    }

    /// Round to `dp` decimal places using banker's rounding.
    pub fn round_dp(self, dp: u32) -> Decimal {
        Decimal(self.0.round_dp(dp))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl FromStr for Decimal {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_canonical(s)
    }
}

impl From<RustDecimal> for Decimal {
    fn from(value: RustDecimal) -> Self {
        Decimal(value)
    }
}

impl From<Decimal> for RustDecimal {
    fn from(value: Decimal) -> Self {
        value.0
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Decimal(RustDecimal::from(value))
    }
}

impl From<u32> for Decimal {
    fn from(value: u32) -> Self {
        Decimal(RustDecimal::from(value))
    }
}

impl std::ops::Add for Decimal {
    type Output = Decimal;

    fn add(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 + rhs.0)
    }
}

impl std::ops::AddAssign for Decimal {
    fn add_assign(&mut self, rhs: Decimal) {
        self.0 += rhs.0;
    }
}

impl std::ops::Sub for Decimal {
    type Output = Decimal;

    fn sub(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 - rhs.0)
    }
}

impl std::ops::Mul for Decimal {
    type Output = Decimal;

    fn mul(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 * rhs.0)
    }
}

impl std::ops::Div for Decimal {
    type Output = Decimal;

    fn div(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 / rhs.0)
    }
}

impl std::ops::Neg for Decimal {
    type Output = Decimal;

    fn neg(self) -> Decimal {
        Decimal(-self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_decimal_canonical_strips_trailing_zeros() {
        assert_eq!(d("1000.500").to_canonical_string(), "1000.5");
        assert_eq!(d("  42 ").to_canonical_string(), "42");
    }

    #[test]
    fn test_decimal_json_is_exact_string() {
        let value = d("0.1") + d("0.2");
        let json = serde_json::to_value(value).unwrap();
        assert!(json.is_string());
        assert_eq!(json, serde_json::json!("0.3"));

        let back: Decimal = serde_json::from_value(json).unwrap();
        assert_eq!(back, d("0.3"));
    }

    #[test]
    fn test_percent_to_fraction() {
        assert_eq!(d("10").percent_to_fraction(), d("0.1"));
        assert_eq!(Decimal::HUNDRED.percent_to_fraction(), Decimal::ONE);
    }

    #[test]
    fn test_checked_div_by_zero() {
        assert_eq!(d("5").checked_div(Decimal::ZERO), None);
        assert_eq!(d("5").checked_div(d("2")), Some(d("2.5")));
    }

    #[test]
    fn test_sign_helpers() {
        assert!(d("0.0001").is_positive());
        assert!(d("-3").is_negative());
        assert!(!Decimal::ZERO.is_positive());
        assert!(!Decimal::ZERO.is_negative());
    }
}
