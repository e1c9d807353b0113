//! Decimal helpers shared by the rule codec and both evaluators.
//!
//! Rule values were historically stored by the admin UI as JSON strings
//! (`"50"`), while other clients send plain numbers. Both forms are accepted
//! on input; values are always written back as strings.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A JSON scalar that may carry a number either as a string or as a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum NumberOrString {
    Number(serde_json::Number),
    String(String),
}

impl NumberOrString {
    /// The scalar as text, trimmed.
    pub(crate) fn as_text(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::String(s) => s.trim().to_string(),
        }
    }

    pub(crate) fn to_decimal(&self) -> Option<Decimal> {
        parse_decimal(&self.as_text())
    }
}

/// Parse a decimal from text, accepting plain and scientific notation.
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

/// Rate used when the runtime supplies no usable presentment rate.
///
/// Missing, zero and negative rates all fall back to `1`.
pub fn effective_rate(rate: Option<Decimal>) -> Decimal {
    match rate {
        Some(r) if r > Decimal::ZERO => r,
        _ => Decimal::ONE,
    }
}

/// Convert a base-currency amount into the presentment currency.
///
/// Returns `None` when the product does not fit in a [`Decimal`].
pub fn to_presentment(amount: Decimal, rate: Decimal) -> Option<Decimal> {
    let converted = amount.checked_mul(rate);
    if converted.is_none() {
        tracing::warn!(%amount, %rate, "Presentment conversion overflowed");
    }
    converted
}

/// Serde adapter for decimals stored as strings or numbers.
pub(crate) mod decimal_text {
    use rust_decimal::Decimal;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::NumberOrString;

    pub fn serialize<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.normalize().to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
        let raw = NumberOrString::deserialize(deserializer)?;
        raw.to_decimal()
            .ok_or_else(|| D::Error::custom(format!("invalid decimal value '{}'", raw.as_text())))
    }
}

/// Serde adapter for integers stored as strings or numbers.
///
/// Fractional input is truncated toward zero (`"5.7"` reads as `5`).
pub(crate) mod integer_text {
    use rust_decimal::prelude::ToPrimitive;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::NumberOrString;

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        let raw = NumberOrString::deserialize(deserializer)?;
        raw.to_decimal()
            .and_then(|d| d.trunc().to_i64())
            .ok_or_else(|| D::Error::custom(format!("invalid integer value '{}'", raw.as_text())))
    }
}
