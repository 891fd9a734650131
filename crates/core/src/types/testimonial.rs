//! Customer testimonial record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use super::id::{StoreId, TestimonialId};
use super::lenient::{null_as_default, null_as_true, number_or_numeric_string};

const fn default_visible() -> bool {
    true
}

/// One customer review (`testimonios` row).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Testimonial {
    pub id: TestimonialId,
    /// Stable, human-chosen identifier used for DOM addressing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dom_id: Option<String>,
    #[serde(rename = "tienda_id", default, skip_serializing_if = "Option::is_none")]
    pub store_id: Option<StoreId>,
    /// Author name.
    #[serde(rename = "nombre", default, deserialize_with = "null_as_default")]
    pub author: String,
    #[serde(rename = "texto", default, deserialize_with = "null_as_default")]
    pub body: String,
    /// Star rating, 1 to 5.
    #[serde(
        default,
        deserialize_with = "number_or_numeric_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub rating: Option<Number>,
    /// Label of the purchased item.
    #[serde(rename = "producto", default, skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default = "default_visible", deserialize_with = "null_as_true")]
    pub visible: bool,
    #[serde(rename = "orden", default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Testimonial {
    /// The whole record as JSON, for dot-path reads.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Write `value` at `path` and re-read the typed record.
    ///
    /// # Errors
    ///
    /// Returns an error if the write produces a record that no longer
    /// deserializes (e.g. a textual `rating`).
    pub fn set_path(&mut self, field: &str, value: Value) -> Result<(), serde_json::Error> {
        let mut raw = self.to_value();
        crate::path::set_path(&mut raw, field, value);
        *self = serde_json::from_value(raw)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_deserialize_row() {
        let t: Testimonial = serde_json::from_value(json!({
            "id": "t-1",
            "dom_id": "ana",
            "nombre": "Ana",
            "texto": "Excelente",
            "rating": 5,
            "producto": "Pizza Napolitana",
            "orden": 2
        }))
        .unwrap();
        assert_eq!(t.author, "Ana");
        assert_eq!(t.rating.as_ref().and_then(Number::as_u64), Some(5));
        assert_eq!(t.order, Some(2));
        assert!(t.visible);
    }

    #[test]
    fn test_null_columns_and_textual_rating() {
        let t: Testimonial = serde_json::from_value(json!({
            "id": 4,
            "nombre": null,
            "texto": null,
            "rating": "5",
            "visible": null
        }))
        .unwrap();
        assert_eq!(t.author, "");
        assert_eq!(t.body, "");
        assert_eq!(t.rating.as_ref().and_then(Number::as_u64), Some(5));
        assert!(t.visible);
    }

    #[test]
    fn test_set_path_rejects_bad_rating() {
        let mut t = Testimonial::default();
        assert!(t.set_path("rating", json!("cinco")).is_err());
        t.set_path("texto", json!("Muy rico")).unwrap();
        assert_eq!(t.body, "Muy rico");
    }
}
