//! Deserializers for nullable backend columns.
//!
//! `#[serde(default)]` only covers a missing key; these also accept an
//! explicit `null`, which nullable Postgres columns send routinely.

use serde::de::{self, Deserialize, Deserializer};
use serde_json::{Number, Value};

/// `null` becomes `T::default()`.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// `null` becomes `true` (visibility flags).
pub fn null_as_true<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(true))
}

/// A number, or a string holding one. `null` and blank strings are `None`.
pub fn number_or_numeric_string<'de, D>(deserializer: D) -> Result<Option<Number>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(Some(n)),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s.trim().parse::<Number>().map(Some).map_err(|_| {
            de::Error::invalid_value(de::Unexpected::Str(&s), &"a number or numeric string")
        }),
        Some(other) => Err(de::Error::custom(format!("expected a number, got {other}"))),
    }
}
