//! Store (tenant site) record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::id::StoreId;
use super::lenient::null_as_default;
use super::status::{PaymentState, Plan};
use crate::path;

/// Well-known `siteConfig` section names.
pub mod sections {
    pub const CONFIG: &str = "config";
    pub const HERO: &str = "hero";
    pub const FOOTER: &str = "footer";
    pub const TESTIMONIALS_SECTION: &str = "testimonios_config";
    pub const TESTIMONIAL_OVERRIDES: &str = "testimonios";
    pub const PRODUCT_OVERRIDES: &str = "custom_product_overrides";
    pub const MENU: &str = "menu";
    pub const CUSTOM: &str = "custom";
}

/// One tenant site (`tiendas` row).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Store {
    pub id: StoreId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub slug: String,
    /// Display name.
    #[serde(rename = "nombre", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Nested `section -> field -> value` site configuration.
    #[serde(rename = "config", default)]
    pub site_config: Value,
    #[serde(rename = "estado_pago", default, deserialize_with = "null_as_default")]
    pub paid: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub plan: Plan,
    #[serde(rename = "fin_trial", default, skip_serializing_if = "Option::is_none")]
    pub trial_ends_at: Option<DateTime<Utc>>,
    /// Every other column, kept so top-level lookups can reach it.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Store {
    /// Billing view of this store.
    #[must_use]
    pub fn payment_state(&self) -> PaymentState {
        PaymentState {
            paid: self.paid,
            plan: self.plan.clone(),
            trial_ends_at: self.trial_ends_at,
        }
    }

    /// Read a present value at `path` inside the site configuration.
    #[must_use]
    pub fn config_value(&self, path: &str) -> Option<&Value> {
        path::get_present(&self.site_config, path)
    }

    /// Write `value` at `path` inside the site configuration.
    pub fn set_config_value(&mut self, path: &str, value: Value) {
        path::set_path(&mut self.site_config, path, value);
    }

    /// Read a present top-level column by name.
    #[must_use]
    pub fn column(&self, field: &str) -> Option<Value> {
        match field {
            "nombre" => self.name.clone().map(Value::String),
            "slug" => Some(Value::String(self.slug.clone())),
            _ => {
                let (head, rest) = field.split_once('.').unwrap_or((field, ""));
                self.extra
                    .get(head)
                    .and_then(|column| path::get_path(column, rest))
                    .cloned()
            }
        }
        .filter(path::is_present)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_deserialize_backend_row() {
        let store: Store = serde_json::from_value(json!({
            "id": "a0b1",
            "slug": "pizzeria-don-pepe",
            "nombre": "Don Pepe",
            "config": {"hero": {"titulo": "Las mejores pizzas"}},
            "estado_pago": true,
            "plan": "pro",
            "whatsapp": "+56911112222"
        }))
        .unwrap();

        assert_eq!(store.slug, "pizzeria-don-pepe");
        assert_eq!(store.config_value("hero.titulo"), Some(&json!("Las mejores pizzas")));
        assert_eq!(store.column("whatsapp"), Some(json!("+56911112222")));
        assert_eq!(store.column("nombre"), Some(json!("Don Pepe")));
        assert!(store.payment_state().paid);
    }

    #[test]
    fn test_null_columns_take_defaults() {
        let store: Store = serde_json::from_value(json!({
            "id": 1,
            "slug": null,
            "nombre": null,
            "config": null,
            "estado_pago": null,
            "plan": null,
            "fin_trial": null
        }))
        .unwrap();

        assert_eq!(store.slug, "");
        assert_eq!(store.column("nombre"), None);
        assert!(!store.paid);
        assert_eq!(store.plan, Plan::default());
        assert_eq!(store.config_value("hero.titulo"), None);
    }

    #[test]
    fn test_set_config_value_on_null_config() {
        let mut store = Store::default();
        store.set_config_value("footer.direccion", json!("Av. Siempre Viva 742"));
        assert_eq!(
            store.config_value("footer.direccion"),
            Some(&json!("Av. Siempre Viva 742"))
        );
    }
}
