//! Catalog product record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::id::{ProductId, StoreId};
use super::lenient::{null_as_default, null_as_true};
use crate::path;

const fn default_visible() -> bool {
    true
}

/// One catalog entry (`productos` row).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Product {
    pub id: ProductId,
    /// Stable, human-chosen identifier used for DOM addressing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dom_id: Option<String>,
    #[serde(rename = "tienda_id", default, skip_serializing_if = "Option::is_none")]
    pub store_id: Option<StoreId>,
    #[serde(rename = "nombre", default, deserialize_with = "null_as_default")]
    pub name: String,
    /// Base price, stored as-is.
    #[serde(rename = "precio", default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Value>,
    #[serde(rename = "categoria", default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(rename = "imagen_url", default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default = "default_visible", deserialize_with = "null_as_true")]
    pub visible: bool,
    #[serde(rename = "configuracion", default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<ProductConfiguration>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Optional pricing structure of a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProductConfiguration {
    /// Priced variants; the first one is the display default.
    #[serde(
        rename = "variantes",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub variants: Vec<Variant>,
    /// Named price map such as `{ "fam": 12990, "ind": 6990 }`.
    #[serde(
        rename = "precios",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Map::is_empty"
    )]
    pub prices: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A priced variant (size, format, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Variant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(rename = "nombre", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "tipo", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(rename = "precio", default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Variant {
    /// Labels this variant can be matched by: name, id and type.
    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        let id = self.id.as_ref().map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
        [self.name.clone(), id, self.kind.clone()]
            .into_iter()
            .flatten()
            .collect()
    }
}

impl Product {
    /// Priced variants, empty when the product has none.
    #[must_use]
    pub fn variants(&self) -> &[Variant] {
        self.configuration
            .as_ref()
            .map(|c| c.variants.as_slice())
            .unwrap_or_default()
    }

    /// Named price for `size` from the price map.
    #[must_use]
    pub fn sized_price(&self, size: &str) -> Option<&Value> {
        self.configuration
            .as_ref()
            .and_then(|c| c.prices.get(size))
            .filter(|v| path::is_present(v))
    }

    /// Price shown when no size is requested.
    ///
    /// When variants exist the first variant's price wins over the base price.
    #[must_use]
    pub fn display_price(&self) -> Option<&Value> {
        self.variants()
            .first()
            .and_then(|v| v.price.as_ref())
            .filter(|v| path::is_present(v))
            .or_else(|| self.price.as_ref().filter(|v| path::is_present(v)))
    }

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
    /// deserializes (e.g. a non-object `configuracion`).
    pub fn set_path(&mut self, field: &str, value: Value) -> Result<(), serde_json::Error> {
        let mut raw = self.to_value();
        path::set_path(&mut raw, field, value);
        *self = serde_json::from_value(raw)?;
        Ok(())
    }
}
