//! Newtype IDs for type-safe record references.
//!
//! The backend hands out row ids as integers for some tables and as UUID
//! strings for others, so every ID wraps a [`RecordId`] that accepts both.
//! Use the `define_id!` macro to create wrappers that prevent accidentally
//! mixing IDs from different tables.

use serde::{Deserialize, Serialize};

/// A backend row id, numeric or textual.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Number(i64),
    Text(String),
}

impl RecordId {
    /// Whether this id renders to exactly `candidate`.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            Self::Number(n) => candidate == n.to_string(),
            Self::Text(s) => s == candidate,
        }
    }

    /// Convert to a JSON value suitable for a `where` clause.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Number(n) => serde_json::Value::from(*n),
            Self::Text(s) => serde_json::Value::from(s.as_str()),
        }
    }
}

impl ::core::fmt::Display for RecordId {
    fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        Self::Number(id)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self::Text(id.to_owned())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self::Text(id)
    }
}

/// Macro to define a type-safe ID wrapper.
///
/// Creates a newtype wrapper around [`RecordId`] with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `Default`
/// - `Display`, `matches()`, `to_json()` delegating to the inner id
/// - `From<i64>` and `From<&str>` implementations
///
/// # Example
///
/// ```rust
/// # use mineiro_core::define_id;
/// define_id!(OrderId);
/// define_id!(CouponId);
///
/// let order = OrderId::from(7);
/// assert!(order.matches("7"));
///
/// // These are different types, so this won't compile:
/// // let _: OrderId = CouponId::from(7);
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            Default,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name($crate::RecordId);

        impl $name {
            /// Wrap a raw record id.
            #[must_use]
            pub const fn new(id: $crate::RecordId) -> Self {
                Self(id)
            }

            /// Get the underlying record id.
            #[must_use]
            pub const fn as_record(&self) -> &$crate::RecordId {
                &self.0
            }

            /// Whether this id renders to exactly `candidate`.
            #[must_use]
            pub fn matches(&self, candidate: &str) -> bool {
                self.0.matches(candidate)
            }

            /// Convert to a JSON value suitable for a `where` clause.
            #[must_use]
            pub fn to_json(&self) -> ::serde_json::Value {
                self.0.to_json()
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self($crate::RecordId::from(id))
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self($crate::RecordId::from(id))
            }
        }
    };
}

// Define standard record IDs
define_id!(StoreId);
define_id!(ProductId);
define_id!(TestimonialId);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_accepts_numbers_and_strings() {
        let n: RecordId = serde_json::from_str("42").unwrap();
        let s: RecordId = serde_json::from_str("\"a1b2\"").unwrap();
        assert_eq!(n, RecordId::Number(42));
        assert_eq!(s, RecordId::Text("a1b2".to_string()));
    }

    #[test]
    fn test_matches() {
        assert!(ProductId::from(42).matches("42"));
        assert!(!ProductId::from(42).matches("042x"));
        assert!(StoreId::from("uuid-1").matches("uuid-1"));
    }

    #[test]
    fn test_serde_transparent() {
        let id = TestimonialId::from(9);
        assert_eq!(serde_json::to_string(&id).unwrap(), "9");
    }
}
