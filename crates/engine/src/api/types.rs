//! Wire types for the Mineiro API and push channel.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use mineiro_core::{Product, Store, StoreSnapshot, Table, Testimonial};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Conflict key for rows created from the page.
pub const DOM_ID_CONFLICT_KEY: &str = "tienda_id,dom_id";

/// Body of `GET /tienda`.
///
/// Rows stay loose until [`SnapshotResponse::into_snapshot`], so one
/// malformed row is dropped instead of failing the whole fetch.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotResponse {
    #[serde(default)]
    pub found: bool,
    #[serde(default)]
    pub tienda: Option<Store>,
    #[serde(default, deserialize_with = "rows")]
    pub productos: Vec<Value>,
    #[serde(default, deserialize_with = "rows")]
    pub testimonios: Vec<Value>,
}

impl SnapshotResponse {
    /// The snapshot, or `None` when the store was not found.
    #[must_use]
    pub fn into_snapshot(self) -> Option<StoreSnapshot> {
        if !self.found {
            return None;
        }
        Some(StoreSnapshot {
            store: self.tienda?,
            products: typed_rows::<Product>(Table::Productos, self.productos),
            testimonials: typed_rows::<Testimonial>(Table::Testimonios, self.testimonios),
        })
    }
}

/// A `null` row list reads as empty.
fn rows<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default())
}

fn typed_rows<T: DeserializeOwned>(table: Table, rows: Vec<Value>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.get("id").cloned().unwrap_or(Value::Null);
            serde_json::from_value(row)
                .map_err(|e| warn!(%table, %id, error = %e, "Skipping malformed row"))
                .ok()
        })
        .collect()
}

/// Kind of write accepted by `POST /edit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteAction {
    Update,
    Upsert,
    Insert,
}

/// Body of `POST /edit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteRequest {
    pub action: WriteAction,
    pub table: Table,
    pub data: Value,
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    #[serde(rename = "onConflict", default, skip_serializing_if = "Option::is_none")]
    pub on_conflict: Option<String>,
}

impl WriteRequest {
    /// Update the rows of `table` matching `filter`.
    #[must_use]
    pub const fn update(table: Table, data: Value, filter: Value) -> Self {
        Self {
            action: WriteAction::Update,
            table,
            data,
            filter: Some(filter),
            on_conflict: None,
        }
    }

    /// Create or update a row keyed by store and `dom_id`.
    #[must_use]
    pub fn upsert_by_dom_id(table: Table, data: Value) -> Self {
        Self {
            action: WriteAction::Upsert,
            table,
            data,
            filter: None,
            on_conflict: Some(DOM_ID_CONFLICT_KEY.to_string()),
        }
    }
}

/// Body returned by `POST /edit`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WriteResponse {
    #[must_use]
    pub const fn ok(data: Option<Value>) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

/// Row change delivered by the push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: Table,
    #[serde(rename = "eventType")]
    pub event_type: ChangeEventType,
    /// The row after the change (before it, for deletes).
    pub record: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeEventType {
    #[serde(alias = "insert")]
    Insert,
    #[serde(alias = "update")]
    Update,
    #[serde(alias = "delete")]
    Delete,
}

/// An image picked by the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    /// Inline `data:` URL, used when the upload endpoint fails.
    #[must_use]
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.content_type, STANDARD.encode(&self.bytes))
    }
}

/// Body returned by the upload endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    #[serde(alias = "publicUrl", alias = "public_url")]
    pub url: String,
}
