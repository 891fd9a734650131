//! Inverse writes: binding address + new value to backend requests.
//!
//! Planning is pure and uses the resolver's identifier lookup, so a row the
//! resolver cannot find is written to the override bucket it falls back to.

use mineiro_core::{Price, Product, StoreSnapshot, Table, Testimonial};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::info;

use crate::address::BindingAddress;
use crate::api::WriteRequest;
use crate::apply::{FieldKind, classify_field};
use crate::config::EngineConfig;
use crate::resolve::{self, STORE_NAME_FIELD};

/// Errors that can occur when planning a write.
#[derive(Debug, Error)]
pub enum WritebackError {
    /// The value does not fit the column it targets.
    #[error("Invalid value for {field}: {source}")]
    InvalidValue {
        field: String,
        #[source]
        source: serde_json::Error,
    },

    /// Quick-add needs a non-empty `dom_id`.
    #[error("A dom_id is required")]
    MissingDomId,
}

/// Id prefix of rows created locally by quick-add until the backend returns
/// the real row.
pub const PROVISIONAL_ID_PREFIX: &str = "dom:";

/// A change to merge into the local snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalChange {
    /// Write at a path inside the site configuration.
    StoreConfig { path: String, value: Value },
    /// Write a top-level store column.
    StoreColumn { column: String, value: Value },
    /// Replace (or add) a product row.
    Product(Product),
    /// Replace (or add) a testimonial row.
    Testimonial(Testimonial),
}

/// Requests to send and the local changes they stand for.
///
/// `changes[i]` is what `requests[i]` does to the backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WritePlan {
    pub requests: Vec<WriteRequest>,
    pub changes: Vec<LocalChange>,
}

impl WritePlan {
    /// Merge the plan's changes into `snapshot`.
    pub fn apply(&self, snapshot: &mut StoreSnapshot) {
        self.apply_where(snapshot, |_| true);
    }

    /// Merge the changes whose index passes `landed`.
    pub fn apply_where(&self, snapshot: &mut StoreSnapshot, landed: impl Fn(usize) -> bool) {
        for (i, change) in self.changes.iter().enumerate() {
            if !landed(i) {
                continue;
            }
            match change {
                LocalChange::StoreConfig { path, value } => {
                    snapshot.store.set_config_value(path, value.clone());
                }
                LocalChange::StoreColumn { column, value } => match column.as_str() {
                    "nombre" => snapshot.store.name = value.as_str().map(ToString::to_string),
                    _ => {
                        snapshot.store.extra.insert(column.clone(), value.clone());
                    }
                },
                LocalChange::Product(product) => snapshot.upsert_product(product.clone()),
                LocalChange::Testimonial(testimonial) => {
                    snapshot.upsert_testimonial(testimonial.clone());
                }
            }
        }
    }
}

/// Normalize an edited value for the field it targets: prices and ratings
/// typed as text become numbers, everything else is kept.
#[must_use]
pub fn coerce_value(field: &str, value: Value) -> Value {
    let Value::String(text) = &value else {
        return value;
    };
    let coerced = match classify_field(field) {
        FieldKind::Price => Price::parse(text).ok().map(|price| price.to_json()),
        FieldKind::Rating => {
            let text = text.trim().replace(',', ".");
            text.parse::<i64>().ok().map(Value::from).or_else(|| {
                text.parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
            })
        }
        _ => None,
    };
    coerced.unwrap_or(value)
}

/// Plan the writes that persist `value` at `address`.
///
/// # Errors
///
/// Returns an error if the value does not fit the targeted row column.
pub fn plan_write(
    address: &BindingAddress,
    value: Value,
    snapshot: &StoreSnapshot,
    config: &EngineConfig,
) -> Result<WritePlan, WritebackError> {
    let value = coerce_value(address.field(), value);
    match address {
        BindingAddress::Config { field } => Ok(plan_config(address, field, value, snapshot)),
        BindingAddress::Testimonial { dom_id, field } => {
            match resolve::find_testimonial(&snapshot.testimonials, dom_id) {
                Some(row) => plan_testimonial_row(row, field, value),
                None => Ok(plan_override(address, value, snapshot)),
            }
        }
        BindingAddress::Product {
            identifier,
            field,
            category,
        } => match resolve::find_product(&snapshot.products, identifier, category.as_deref()) {
            Some(row) => plan_product_row(row, field, value, config),
            None => Ok(plan_override(address, value, snapshot)),
        },
        BindingAddress::Hero { .. }
        | BindingAddress::Footer { .. }
        | BindingAddress::TestimonialSectionConfig { .. }
        | BindingAddress::MenuCategory { .. }
        | BindingAddress::Generic { .. } => Ok(store_config_write(
            snapshot,
            resolve::fallback_config_path(address),
            value,
        )),
    }
}

/// Plan the upsert of a product row created from the page.
///
/// # Errors
///
/// Returns an error if `dom_id` is empty or the fields do not form a product.
pub fn plan_quick_add_product(
    snapshot: &StoreSnapshot,
    dom_id: &str,
    fields: Map<String, Value>,
) -> Result<WritePlan, WritebackError> {
    let data = quick_add_data(snapshot, dom_id, fields)?;
    let existing = snapshot
        .products
        .iter()
        .find(|p| p.dom_id.as_deref() == Some(dom_id));
    let row = merged_row(existing.map(Product::to_value), &data, dom_id)?;
    Ok(WritePlan {
        requests: vec![WriteRequest::upsert_by_dom_id(Table::Productos, data)],
        changes: vec![LocalChange::Product(row)],
    })
}

/// Plan the upsert of a testimonial row created from the page.
///
/// # Errors
///
/// Returns an error if `dom_id` is empty or the fields do not form a
/// testimonial.
pub fn plan_quick_add_testimonial(
    snapshot: &StoreSnapshot,
    dom_id: &str,
    fields: Map<String, Value>,
) -> Result<WritePlan, WritebackError> {
    let data = quick_add_data(snapshot, dom_id, fields)?;
    let existing = snapshot
        .testimonials
        .iter()
        .find(|t| t.dom_id.as_deref() == Some(dom_id));
    let row = merged_row(existing.map(Testimonial::to_value), &data, dom_id)?;
    Ok(WritePlan {
        requests: vec![WriteRequest::upsert_by_dom_id(Table::Testimonios, data)],
        changes: vec![LocalChange::Testimonial(row)],
    })
}

// =============================================================================
// Store writes
// =============================================================================

fn plan_config(
    address: &BindingAddress,
    field: &str,
    value: Value,
    snapshot: &StoreSnapshot,
) -> WritePlan {
    let store = &snapshot.store;
    let path = resolve::fallback_config_path(address);

    // A value currently read from a top-level column is written back there.
    if store.config_value(&path).is_none() && !field.contains('.') {
        let column = if field == STORE_NAME_FIELD { "nombre" } else { field };
        if store.column(column).is_some() {
            return WritePlan {
                requests: vec![WriteRequest::update(
                    Table::Tiendas,
                    json!({ column: value.clone() }),
                    json!({ "id": store.id.to_json() }),
                )],
                changes: vec![LocalChange::StoreColumn {
                    column: column.to_string(),
                    value,
                }],
            };
        }
    }

    store_config_write(snapshot, path, value)
}

fn plan_override(address: &BindingAddress, value: Value, snapshot: &StoreSnapshot) -> WritePlan {
    info!(address = %address, "No row for identifier, writing to override bucket");
    store_config_write(snapshot, resolve::fallback_config_path(address), value)
}

fn store_config_write(snapshot: &StoreSnapshot, path: String, value: Value) -> WritePlan {
    let mut store = snapshot.store.clone();
    store.set_config_value(&path, value.clone());
    WritePlan {
        requests: vec![WriteRequest::update(
            Table::Tiendas,
            json!({ "config": store.site_config }),
            json!({ "id": store.id.to_json() }),
        )],
        changes: vec![LocalChange::StoreConfig { path, value }],
    }
}

// =============================================================================
// Row writes
// =============================================================================

fn plan_testimonial_row(
    row: &Testimonial,
    field: &str,
    value: Value,
) -> Result<WritePlan, WritebackError> {
    let mut updated = row.clone();
    updated
        .set_path(field, value)
        .map_err(|source| invalid(field, source))?;
    let data = columns(&updated.to_value(), &[root_column(field)]);
    Ok(WritePlan {
        requests: vec![WriteRequest::update(
            Table::Testimonios,
            data,
            json!({ "id": row.id.to_json() }),
        )],
        changes: vec![LocalChange::Testimonial(updated)],
    })
}

fn plan_product_row(
    row: &Product,
    field: &str,
    value: Value,
    config: &EngineConfig,
) -> Result<WritePlan, WritebackError> {
    let mut updated = row.clone();
    let touched: Vec<&str> = if field == "precio" {
        // The first variant is what `precio` displays, so it moves too.
        updated.price = Some(value.clone());
        match updated.configuration.as_mut().and_then(|c| c.variants.first_mut()) {
            Some(first) => {
                first.price = Some(value);
                vec!["precio", "configuracion"]
            }
            None => vec!["precio"],
        }
    } else if let Some(size) = field.strip_prefix("precio.") {
        updated
            .set_path(&format!("configuracion.precios.{size}"), value.clone())
            .map_err(|source| invalid(field, source))?;
        let variant = resolve::match_variant_index(updated.variants(), size);
        if let (Some(i), Some(configuration)) = (variant, updated.configuration.as_mut())
            && let Some(v) = configuration.variants.get_mut(i)
        {
            v.price = Some(value.clone());
        }
        if config.is_default_size(size) {
            updated.price = Some(value);
            vec!["configuracion", "precio"]
        } else {
            vec!["configuracion"]
        }
    } else {
        updated
            .set_path(field, value)
            .map_err(|source| invalid(field, source))?;
        vec![root_column(field)]
    };

    let data = columns(&updated.to_value(), &touched);
    Ok(WritePlan {
        requests: vec![WriteRequest::update(
            Table::Productos,
            data,
            json!({ "id": row.id.to_json() }),
        )],
        changes: vec![LocalChange::Product(updated)],
    })
}

fn quick_add_data(
    snapshot: &StoreSnapshot,
    dom_id: &str,
    mut fields: Map<String, Value>,
) -> Result<Value, WritebackError> {
    let dom_id = dom_id.trim();
    if dom_id.is_empty() {
        return Err(WritebackError::MissingDomId);
    }
    fields.insert("dom_id".to_string(), Value::from(dom_id));
    fields.insert("tienda_id".to_string(), snapshot.store.id.to_json());
    for (key, value) in &mut fields {
        *value = coerce_value(key, std::mem::take(value));
    }
    Ok(Value::Object(fields))
}

/// Existing row (or a provisional one) with `data` merged on top.
fn merged_row<T: serde::de::DeserializeOwned>(
    existing: Option<Value>,
    data: &Value,
    dom_id: &str,
) -> Result<T, WritebackError> {
    let mut row =
        existing.unwrap_or_else(|| json!({ "id": format!("{PROVISIONAL_ID_PREFIX}{dom_id}") }));
    if let (Value::Object(row), Value::Object(data)) = (&mut row, data) {
        for (key, value) in data {
            row.insert(key.clone(), value.clone());
        }
    }
    serde_json::from_value(row).map_err(|source| invalid("dom_id", source))
}

/// Merge a product row from the backend, replacing a provisional row with
/// the same `dom_id`.
pub fn merge_product_row(snapshot: &mut StoreSnapshot, product: Product) {
    if let Some(dom_id) = product.dom_id.clone() {
        snapshot.products.retain(|p| {
            p.id == product.id
                || p.dom_id.as_deref() != Some(dom_id.as_str())
                || !p.id.to_string().starts_with(PROVISIONAL_ID_PREFIX)
        });
    }
    snapshot.upsert_product(product);
}

/// Merge a testimonial row from the backend, replacing a provisional row
/// with the same `dom_id`.
pub fn merge_testimonial_row(snapshot: &mut StoreSnapshot, testimonial: Testimonial) {
    if let Some(dom_id) = testimonial.dom_id.clone() {
        snapshot.testimonials.retain(|t| {
            t.id == testimonial.id
                || t.dom_id.as_deref() != Some(dom_id.as_str())
                || !t.id.to_string().starts_with(PROVISIONAL_ID_PREFIX)
        });
    }
    snapshot.upsert_testimonial(testimonial);
}

fn root_column(field: &str) -> &str {
    field.split('.').next().unwrap_or(field)
}

fn columns(row: &Value, names: &[&str]) -> Value {
    let data: Map<String, Value> = names
        .iter()
        .map(|name| {
            (
                (*name).to_string(),
                row.get(*name).cloned().unwrap_or(Value::Null),
            )
        })
        .collect();
    Value::Object(data)
}

fn invalid(field: &str, source: serde_json::Error) -> WritebackError {
    WritebackError::InvalidValue {
        field: field.to_string(),
        source,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use mineiro_core::ProductId;
    use url::Url;

    use super::*;
    use crate::api::WriteAction;

    fn config() -> EngineConfig {
        EngineConfig::new(Url::parse("https://app.mineiro.cl/api").unwrap(), "don-pepe")
    }

    fn snapshot() -> StoreSnapshot {
        serde_json::from_value(json!({
            "tienda": {
                "id": 1,
                "slug": "don-pepe",
                "nombre": "Don Pepe",
                "whatsapp": "+56911112222",
                "config": {"hero": {"titulo": "Hola"}}
            },
            "productos": [{
                "id": 7,
                "dom_id": "napo",
                "nombre": "Napolitana",
                "precio": 9990,
                "configuracion": {
                    "variantes": [
                        {"nombre": "Familiar", "precio": 12990},
                        {"nombre": "Individual", "precio": 6990}
                    ],
                    "precios": {"fam": 12990, "ind": 6990}
                }
            }],
            "testimonios": [{"id": 3, "dom_id": "ana", "nombre": "Ana", "texto": "Rica", "rating": 4}]
        }))
        .unwrap()
    }

    fn plan(raw: &str, value: Value) -> (WritePlan, StoreSnapshot) {
        let mut s = snapshot();
        let plan = plan_write(&BindingAddress::parse(raw), value, &s, &config()).unwrap();
        plan.apply(&mut s);
        (plan, s)
    }

    #[test]
    fn test_section_write_sends_whole_config() {
        let (plan, s) = plan("hero.subtitulo", json!("Desde 1990"));
        let request = &plan.requests[0];
        assert_eq!(request.table, Table::Tiendas);
        assert_eq!(request.action, WriteAction::Update);
        assert_eq!(request.filter, Some(json!({"id": 1})));
        assert_eq!(
            request.data,
            json!({"config": {"hero": {"titulo": "Hola", "subtitulo": "Desde 1990"}}})
        );
        assert_eq!(s.store.config_value("hero.subtitulo"), Some(&json!("Desde 1990")));
    }

    #[test]
    fn test_config_column_write() {
        let (plan, s) = plan("whatsapp", json!("+56933334444"));
        assert_eq!(plan.requests[0].data, json!({"whatsapp": "+56933334444"}));
        assert_eq!(s.store.column("whatsapp"), Some(json!("+56933334444")));

        let (plan, s) = self::plan("config-tienda.nombre_tienda", json!("Don Pepe II"));
        assert_eq!(plan.requests[0].data, json!({"nombre": "Don Pepe II"}));
        assert_eq!(s.store.name.as_deref(), Some("Don Pepe II"));
    }

    #[test]
    fn test_product_flat_price_moves_first_variant() {
        let (plan, s) = plan("producto-napo.precio", json!("$13.990"));
        let request = &plan.requests[0];
        assert_eq!(request.table, Table::Productos);
        assert_eq!(request.filter, Some(json!({"id": 7})));
        assert_eq!(request.data["precio"], json!(13990));
        assert_eq!(request.data["configuracion"]["variantes"][0]["precio"], json!(13990));
        assert_eq!(
            resolve::resolve(&BindingAddress::parse("producto-napo.precio"), &s),
            Some(json!(13990))
        );
    }

    #[test]
    fn test_sized_price_default_token_updates_flat() {
        let (plan, s) = plan("producto-napo.precio.fam", json!(14990));
        let data = &plan.requests[0].data;
        assert_eq!(data["configuracion"]["precios"]["fam"], json!(14990));
        assert_eq!(data["configuracion"]["variantes"][0]["precio"], json!(14990));
        assert_eq!(data["precio"], json!(14990));
        assert_eq!(s.products[0].price, Some(json!(14990)));
    }

    #[test]
    fn test_sized_price_other_token_keeps_flat() {
        let (plan, s) = plan("producto-napo.precio.ind", json!(7490));
        let data = &plan.requests[0].data;
        assert_eq!(data["configuracion"]["precios"]["ind"], json!(7490));
        assert_eq!(data["configuracion"]["variantes"][1]["precio"], json!(7490));
        assert!(data.get("precio").is_none());
        assert_eq!(s.products[0].price, Some(json!(9990)));
    }

    #[test]
    fn test_unknown_product_goes_to_override_bucket() {
        let (plan, s) = plan("producto-empanada.nombre", json!("Empanada de pino"));
        assert_eq!(plan.requests[0].table, Table::Tiendas);
        assert_eq!(
            s.store.config_value("custom_product_overrides.empanada.nombre"),
            Some(&json!("Empanada de pino"))
        );
        assert_eq!(
            resolve::resolve(&BindingAddress::parse("producto-empanada.nombre"), &s),
            Some(json!("Empanada de pino"))
        );
        assert_eq!(s.products.len(), 1);
    }

    #[test]
    fn test_testimonial_row_write_coerces_rating() {
        let (plan, s) = plan("testimonio-ana.rating", json!("5"));
        assert_eq!(plan.requests[0].table, Table::Testimonios);
        assert_eq!(plan.requests[0].data, json!({"rating": 5}));
        assert_eq!(s.testimonials[0].rating, Some(serde_json::Number::from(5)));
    }

    #[test]
    fn test_invalid_row_value() {
        let s = snapshot();
        let result = plan_write(
            &BindingAddress::parse("testimonio-ana.rating"),
            json!("muy bueno"),
            &s,
            &config(),
        );
        assert!(matches!(result, Err(WritebackError::InvalidValue { .. })));
    }

    #[test]
    fn test_quick_add_product() {
        let mut s = snapshot();
        let mut fields = Map::new();
        fields.insert("nombre".to_string(), json!("Calzone"));
        fields.insert("precio".to_string(), json!("8.990"));

        let plan = plan_quick_add_product(&s, "calzone", fields).unwrap();
        let request = &plan.requests[0];
        assert_eq!(request.action, WriteAction::Upsert);
        assert_eq!(request.on_conflict.as_deref(), Some("tienda_id,dom_id"));
        assert_eq!(
            request.data,
            json!({"nombre": "Calzone", "precio": 8990, "dom_id": "calzone", "tienda_id": 1})
        );

        plan.apply(&mut s);
        assert_eq!(s.products.len(), 2);
        assert_eq!(
            resolve::resolve(&BindingAddress::parse("producto-calzone.precio"), &s),
            Some(json!(8990))
        );
        assert!(plan_quick_add_product(&s, "  ", Map::new()).is_err());
        assert_eq!(s.products[0].id, ProductId::from(7));
        assert_eq!(s.products[1].id, ProductId::from("dom:calzone"));

        let real: Product = serde_json::from_value(json!({
            "id": 42, "dom_id": "calzone", "nombre": "Calzone", "precio": 8990
        }))
        .unwrap();
        merge_product_row(&mut s, real);
        assert_eq!(s.products.len(), 2);
        assert_eq!(s.products[1].id, ProductId::from(42));
    }
}
