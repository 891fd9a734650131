//! Price parsing and display.
//!
//! Prices are stored by the backend exactly as the operator typed them
//! (usually whole pesos, sometimes with decimals) and are only formatted on
//! the way into the page: `$` prefix, `.` thousands separators, `,` decimals.

use core::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Price`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// The input has no digits at all.
    #[error("price cannot be empty")]
    Empty,
    /// The input could not be read as a number.
    #[error("invalid price: {0}")]
    Invalid(String),
}

/// A display price.
///
/// ## Examples
///
/// ```
/// use mineiro_core::Price;
///
/// assert_eq!(Price::parse("12990").unwrap().display(), "$12.990");
/// assert_eq!(Price::parse("$12.990").unwrap().display(), "$12.990");
/// assert_eq!(Price::parse("4,5").unwrap().display(), "$4,50");
/// assert!(Price::parse("abc").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// Create a price from a decimal amount.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// The underlying amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Parse operator input such as `12990`, `$12.990`, `12.990,50` or `4.5`.
    ///
    /// A `,` is always the decimal separator. Without one, dots followed by
    /// groups of exactly three digits are thousands separators.
    ///
    /// # Errors
    ///
    /// Returns an error if the input holds no digits or is not a number.
    pub fn parse(input: &str) -> Result<Self, PriceError> {
        let cleaned: String = input
            .chars()
            .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
            .collect();

        if !cleaned.chars().any(|c| c.is_ascii_digit()) {
            return Err(PriceError::Empty);
        }

        let normalized = if cleaned.contains(',') {
            cleaned.replace('.', "").replace(',', ".")
        } else if is_thousands_grouped(&cleaned) {
            cleaned.replace('.', "")
        } else {
            cleaned
        };

        Decimal::from_str(&normalized)
            .map(Self)
            .map_err(|_| PriceError::Invalid(input.to_string()))
    }

    /// Read a price out of a JSON value (number or numeric string).
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Decimal::from)
                .or_else(|| n.as_f64().and_then(|f| Decimal::try_from(f).ok()))
                .map(Self),
            serde_json::Value::String(s) => Self::parse(s).ok(),
            _ => None,
        }
    }

    /// Convert to the JSON number the backend stores.
    ///
    /// Whole amounts become integers so they round-trip unchanged.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let normalized = self.0.normalize();
        if normalized.fract().is_zero()
            && let Some(whole) = normalized.to_i64()
        {
            return serde_json::Value::from(whole);
        }
        normalized
            .to_f64()
            .map_or(serde_json::Value::Null, serde_json::Value::from)
    }

    /// Format for display (e.g., `$12.990`, `$4,50`).
    #[must_use]
    pub fn display(&self) -> String {
        let rounded = self.0.abs().round_dp(2);
        let whole = rounded.trunc();
        let cents = ((rounded - whole) * Decimal::from(100)).to_i64().unwrap_or(0);

        let digits = whole.to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(c);
        }

        let sign = if self.0.is_sign_negative() && !self.0.is_zero() {
            "-"
        } else {
            ""
        };

        if cents > 0 {
            format!("{sign}${grouped},{cents:02}")
        } else {
            format!("{sign}${grouped}")
        }
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl FromStr for Price {
    type Err = PriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// `12.990` and `1.234.567` are grouped; `4.5` and `12.99` are not.
fn is_thousands_grouped(s: &str) -> bool {
    let mut parts = s.trim_start_matches('-').split('.');
    let Some(head) = parts.next() else {
        return false;
    };
    let tail: Vec<&str> = parts.collect();
    !head.is_empty()
        && head.len() <= 3
        && !tail.is_empty()
        && tail
            .iter()
            .all(|g| g.len() == 3 && g.chars().all(|c| c.is_ascii_digit()))
}
