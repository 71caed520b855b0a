//! Currency codes and amounts.
//!
//! Amounts are integers in minor units, always. There is no floating point
//! anywhere near money in this crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::StateError;
use crate::config::{CURRENCY_CODE_LENGTH, DEFAULT_MINOR_UNIT_DIGITS};

/// A three-letter uppercase currency code (`USD`, `GBP`, `EUR`, ...).
///
/// Validated on construction and on deserialization, so a `CurrencyCode`
/// in hand is always well-formed.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn new(code: &str) -> Result<Self, StateError> {
        let valid = code.len() == CURRENCY_CODE_LENGTH
            && code.bytes().all(|b| b.is_ascii_uppercase());
        if !valid {
            return Err(StateError::InvalidCurrencyCode {
                code: code.to_string(),
            });
        }
        Ok(Self(code.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Minor-unit digits used for display. Yen has none.
    pub fn minor_unit_digits(&self) -> u32 {
        match self.0.as_str() {
            "JPY" | "KRW" => 0,
            _ => DEFAULT_MINOR_UNIT_DIGITS,
        }
    }
}

impl FromStr for CurrencyCode {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = StateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A quantity of some currency, in minor units.
///
/// # Examples
///
/// ```
/// use mycash_protocol::state::{Amount, CurrencyCode};
///
/// let usd = CurrencyCode::new("USD").unwrap();
/// assert_eq!(Amount::new(12_345, usd).display_decimal(), "123.45 USD");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    pub quantity: u64,
    pub currency: CurrencyCode,
}

impl Amount {
    pub fn new(quantity: u64, currency: CurrencyCode) -> Self {
        Self { quantity, currency }
    }

    pub fn is_zero(&self) -> bool {
        self.quantity == 0
    }

    /// `"123.45 USD"` style rendering.
    pub fn display_decimal(&self) -> String {
        let digits = self.currency.minor_unit_digits();
        if digits == 0 {
            return format!("{} {}", self.quantity, self.currency);
        }
        let divisor = 10u64.pow(digits);
        format!(
            "{}.{:0>width$} {}",
            self.quantity / divisor,
            self.quantity % divisor,
            self.currency,
            width = digits as usize
        )
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.quantity, self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_three_uppercase_letters() {
        assert_eq!(CurrencyCode::new("GBP").unwrap().as_str(), "GBP");
        assert!("usd".parse::<CurrencyCode>().is_err());
        assert!(CurrencyCode::new("USDC").is_err());
        assert!(CurrencyCode::new("U$D").is_err());
        assert!(CurrencyCode::new("").is_err());
    }

    #[test]
    fn deserialization_validates() {
        let ok: CurrencyCode = serde_json::from_str("\"EUR\"").unwrap();
        assert_eq!(ok.as_str(), "EUR");
        assert!(serde_json::from_str::<CurrencyCode>("\"eur\"").is_err());
    }

    #[test]
    fn decimal_display() {
        let usd = CurrencyCode::new("USD").unwrap();
        let jpy = CurrencyCode::new("JPY").unwrap();
        assert_eq!(Amount::new(7_000, usd.clone()).display_decimal(), "70.00 USD");
        assert_eq!(Amount::new(5, usd).display_decimal(), "0.05 USD");
        assert_eq!(Amount::new(500, jpy).display_decimal(), "500 JPY");
    }
}
