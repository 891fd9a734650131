//! Value resolution: binding address + snapshot to a concrete value.
//!
//! Resolution never fails. A miss returns `None` and the element keeps
//! whatever the host page rendered.

use mineiro_core::path;
use mineiro_core::types::store::sections;
use mineiro_core::{Product, StoreSnapshot, Testimonial, Variant};
use serde_json::Value;

use crate::address::BindingAddress;

/// Config field that maps to the store's display name.
pub const STORE_NAME_FIELD: &str = "nombre_tienda";

/// Resolve `address` against `snapshot`.
#[must_use]
pub fn resolve(address: &BindingAddress, snapshot: &StoreSnapshot) -> Option<Value> {
    let store = &snapshot.store;
    match address {
        BindingAddress::Config { field } => store
            .config_value(&fallback_config_path(address))
            .cloned()
            .or_else(|| {
                if field == STORE_NAME_FIELD {
                    store.column("nombre")
                } else {
                    store.column(field)
                }
            }),
        BindingAddress::Hero { .. }
        | BindingAddress::Footer { .. }
        | BindingAddress::TestimonialSectionConfig { .. } => {
            store.config_value(&fallback_config_path(address)).cloned()
        }
        BindingAddress::Generic { raw } => store
            .config_value(&fallback_config_path(address))
            .or_else(|| store.config_value(&path::join(&[sections::CUSTOM, raw.trim()])))
            .cloned(),
        BindingAddress::Testimonial { dom_id, field } => {
            find_testimonial(&snapshot.testimonials, dom_id)
                .and_then(|t| path::get_present(&t.to_value(), field).cloned())
                .or_else(|| store.config_value(&fallback_config_path(address)).cloned())
        }
        BindingAddress::Product {
            identifier,
            field,
            category,
        } => find_product(&snapshot.products, identifier, category.as_deref())
            .and_then(|p| product_field(p, field))
            .or_else(|| store.config_value(&fallback_config_path(address)).cloned()),
        BindingAddress::MenuCategory { field, slug } => store
            .config_value(&fallback_config_path(address))
            .cloned()
            .or_else(|| {
                matches!(field.as_str(), "titulo" | "title")
                    .then(|| Value::String(title_case_slug(slug)))
            }),
    }
}

/// Path inside the site configuration where `address` is stored when it has
/// no backing row.
///
/// Shared by resolution and write-back so a value written to an override
/// bucket is read back from the same place.
#[must_use]
pub fn fallback_config_path(address: &BindingAddress) -> String {
    match address {
        BindingAddress::Config { field } => path::join(&[sections::CONFIG, field]),
        BindingAddress::Hero { field } => path::join(&[sections::HERO, field]),
        BindingAddress::Footer { field } => path::join(&[sections::FOOTER, field]),
        BindingAddress::TestimonialSectionConfig { field } => {
            path::join(&[sections::TESTIMONIALS_SECTION, field])
        }
        BindingAddress::Generic { raw } => path::join(&[sections::CONFIG, raw.trim()]),
        BindingAddress::Testimonial { dom_id, field } => {
            path::join(&[sections::TESTIMONIAL_OVERRIDES, dom_id, field])
        }
        BindingAddress::Product {
            identifier,
            field,
            category: Some(category),
        } => path::join(&[sections::CONFIG, sections::MENU, category, identifier, field]),
        BindingAddress::Product {
            identifier, field, ..
        } => path::join(&[sections::PRODUCT_OVERRIDES, identifier, field]),
        BindingAddress::MenuCategory { slug, field } => {
            path::join(&[sections::MENU, "categorias", slug, field])
        }
    }
}

/// Read `field` from a product, applying the price fallback chain.
#[must_use]
pub fn product_field(product: &Product, field: &str) -> Option<Value> {
    if field == "precio" {
        return product.display_price().cloned();
    }
    if let Some(size) = field.strip_prefix("precio.") {
        return path::get_present(&product.to_value(), field)
            .or_else(|| product.sized_price(size))
            .or_else(|| {
                match_variant(product.variants(), size)
                    .and_then(|v| v.price.as_ref())
                    .filter(|v| path::is_present(v))
            })
            .or_else(|| product.price.as_ref().filter(|v| path::is_present(v)))
            .cloned();
    }
    path::get_present(&product.to_value(), field).cloned()
}

/// Find the product an address identifier refers to.
///
/// Tries, in order: exact `dom_id`, exact id, normalized name equality and
/// normalized name containment in either direction. Within each step a
/// product in the hinted category is preferred.
#[must_use]
pub fn find_product<'a>(
    products: &'a [Product],
    identifier: &str,
    category: Option<&str>,
) -> Option<&'a Product> {
    let wanted = normalize_name(identifier);
    let hint = category.map(normalize_name);

    let pick = |matcher: &dyn Fn(&Product) -> bool| {
        let mut candidates = products.iter().filter(|p| matcher(*p));
        let first = candidates.next()?;
        let Some(hint) = hint.as_deref() else {
            return Some(first);
        };
        std::iter::once(first)
            .chain(candidates)
            .find(|p| p.category.as_deref().map(normalize_name).as_deref() == Some(hint))
            .or(Some(first))
    };

    pick(&|p: &Product| p.dom_id.as_deref() == Some(identifier))
        .or_else(|| pick(&|p: &Product| p.id.matches(identifier)))
        .or_else(|| {
            if wanted.is_empty() {
                return None;
            }
            pick(&|p: &Product| normalize_name(&p.name) == wanted).or_else(|| {
                pick(&|p: &Product| {
                    let name = normalize_name(&p.name);
                    !name.is_empty() && (name.contains(&wanted) || wanted.contains(&name))
                })
            })
        })
}

/// Find a testimonial by `dom_id`, then by id.
#[must_use]
pub fn find_testimonial<'a>(testimonials: &'a [Testimonial], dom_id: &str) -> Option<&'a Testimonial> {
    testimonials
        .iter()
        .find(|t| t.dom_id.as_deref() == Some(dom_id))
        .or_else(|| testimonials.iter().find(|t| t.id.matches(dom_id)))
}

/// Find the variant a size token names.
///
/// An exact normalized match on name, id or type wins over a loose
/// containment match, so `grande` never picks `extra-grande` when both exist.
#[must_use]
pub fn match_variant<'a>(variants: &'a [Variant], size: &str) -> Option<&'a Variant> {
    match_variant_index(variants, size).and_then(|i| variants.get(i))
}

/// Position of the variant [`match_variant`] would pick.
#[must_use]
pub fn match_variant_index(variants: &[Variant], size: &str) -> Option<usize> {
    let size = normalize_name(size);
    if size.is_empty() {
        return None;
    }
    let labels = |v: &Variant| v.labels().iter().map(|l| normalize_name(l)).collect::<Vec<_>>();

    variants
        .iter()
        .position(|v| labels(v).iter().any(|l| *l == size))
        .or_else(|| {
            variants.iter().position(|v| {
                labels(v)
                    .iter()
                    .any(|l| !l.is_empty() && (l.contains(&size) || size.contains(l.as_str())))
            })
        })
}

/// Lowercase, strip accents and collapse everything that is not a letter or
/// digit into single hyphens.
#[must_use]
pub fn normalize_name(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_separator = false;
    for c in input.chars().flat_map(char::to_lowercase) {
        let c = fold_accent(c);
        if c.is_alphanumeric() {
            if pending_separator && !out.is_empty() {
                out.push('-');
            }
            pending_separator = false;
            out.push(c);
        } else {
            pending_separator = true;
        }
    }
    out
}

const fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' | 'â' => 'a',
        'é' | 'è' | 'ë' | 'ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' => 'o',
        'ú' | 'ù' | 'ü' | 'û' => 'u',
        'ñ' => 'n',
        other => other,
    }
}

/// `pizzas-especiales` to `Pizzas Especiales`.
#[must_use]
pub fn title_case_slug(slug: &str) -> String {
    slug.split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use mineiro_core::ProductId;
    use serde_json::json;

    use super::*;

    fn snapshot() -> StoreSnapshot {
        serde_json::from_value(json!({
            "tienda": {
                "id": 1,
                "slug": "don-pepe",
                "nombre": "Pizzería Don Pepe",
                "whatsapp": "+56911112222",
                "config": {
                    "config": {"horario": "12 a 23", "menu": {"pizzas": {"calzone": {"precio": 8990}}}},
                    "hero": {"titulo": "Las mejores pizzas", "vacio": ""},
                    "footer": {"direccion": "Av. Siempre Viva 742"},
                    "testimonios": {"luis": {"texto": "Muy rico"}},
                    "custom_product_overrides": {"empanada": {"nombre": "Empanada de pino"}},
                    "menu": {"categorias": {"pizzas": {"descripcion": "Al horno de barro"}}},
                    "custom": {"promo": {"banner": "2x1"}}
                }
            },
            "productos": [
                {
                    "id": 10,
                    "dom_id": "napo",
                    "nombre": "Pizza Napolitana",
                    "precio": 9990,
                    "categoria": "pizzas",
                    "configuracion": {
                        "variantes": [
                            {"nombre": "Extra Grande", "precio": 15990},
                            {"nombre": "Grande", "precio": 12990},
                            {"nombre": "Individual", "precio": 6990}
                        ],
                        "precios": {"fam": 13990}
                    }
                },
                {"id": 11, "nombre": "Pizza Napolitana", "precio": 4990, "categoria": "promos"},
                {"id": 12, "nombre": "Bebida", "precio": 1990}
            ],
            "testimonios": [
                {"id": 1, "dom_id": "ana", "nombre": "Ana", "texto": "Excelente", "rating": 5}
            ]
        }))
        .unwrap()
    }

    fn resolve_str(raw: &str) -> Option<Value> {
        resolve(&BindingAddress::parse(raw), &snapshot())
    }

    #[test]
    fn test_sections() {
        assert_eq!(resolve_str("hero.titulo"), Some(json!("Las mejores pizzas")));
        assert_eq!(resolve_str("footer.direccion"), Some(json!("Av. Siempre Viva 742")));
        assert_eq!(resolve_str("config-tienda.horario"), Some(json!("12 a 23")));
    }

    #[test]
    fn test_blank_values_are_misses() {
        assert_eq!(resolve_str("hero.vacio"), None);
        assert_eq!(resolve_str("hero.subtitulo"), None);
    }

    #[test]
    fn test_config_falls_back_to_store_columns() {
        assert_eq!(resolve_str("config-tienda.nombre_tienda"), Some(json!("Pizzería Don Pepe")));
        assert_eq!(resolve_str("whatsapp"), Some(json!("+56911112222")));
    }

    #[test]
    fn test_generic_reads_custom_bucket() {
        assert_eq!(resolve_str("promo.banner"), Some(json!("2x1")));
    }

    #[test]
    fn test_testimonial_row_then_override() {
        assert_eq!(resolve_str("testimonio-ana.texto"), Some(json!("Excelente")));
        assert_eq!(resolve_str("testimonio-ana.rating"), Some(json!(5)));
        assert_eq!(resolve_str("testimonio-luis.texto"), Some(json!("Muy rico")));
        assert_eq!(resolve_str("testimonio-zoe.texto"), None);
    }

    #[test]
    fn test_product_lookup_order() {
        let s = snapshot();
        assert_eq!(find_product(&s.products, "napo", None).unwrap().id, ProductId::from(10));
        assert_eq!(find_product(&s.products, "12", None).unwrap().name, "Bebida");
        assert_eq!(
            find_product(&s.products, "pizza-napolitana", None).unwrap().id,
            ProductId::from(10)
        );
        assert_eq!(
            find_product(&s.products, "pizza-napolitana", Some("Promos")).unwrap().id,
            ProductId::from(11)
        );
        assert_eq!(find_product(&s.products, "napolitana", None).unwrap().id, ProductId::from(10));
        assert!(find_product(&s.products, "sushi", None).is_none());
        assert!(find_product(&s.products, "--", None).is_none());
    }

    #[test]
    fn test_price_fallback_chain() {
        // Plain price is the first variant's.
        assert_eq!(resolve_str("producto-napo.precio"), Some(json!(15990)));
        // Named price map.
        assert_eq!(resolve_str("producto-napo.precio.fam"), Some(json!(13990)));
        // Exact variant match beats the looser "Extra Grande".
        assert_eq!(resolve_str("producto-napo.precio.grande"), Some(json!(12990)));
        // Loose variant match.
        assert_eq!(resolve_str("producto-napo.precio.indiv"), Some(json!(6990)));
        // Flat price last.
        assert_eq!(resolve_str("producto-napo.precio.xl"), Some(json!(9990)));
        assert_eq!(resolve_str("producto-12.precio.fam"), Some(json!(1990)));
    }

    #[test]
    fn test_product_overrides() {
        assert_eq!(
            resolve_str("producto-empanada.nombre"),
            Some(json!("Empanada de pino"))
        );
        assert_eq!(resolve_str("menu.pizzas.calzone.precio"), Some(json!(8990)));
        assert_eq!(resolve_str("producto-empanada.precio"), None);
    }

    #[test]
    fn test_menu_category() {
        assert_eq!(
            resolve_str("menu.categorias.pizzas.descripcion"),
            Some(json!("Al horno de barro"))
        );
        assert_eq!(
            resolve_str("menu.categorias.pizzas-especiales.titulo"),
            Some(json!("Pizzas Especiales"))
        );
        assert_eq!(resolve_str("menu.categorias.pizzas.icono"), None);
    }

    #[test]
    fn test_fallback_paths() {
        let p = |raw: &str| fallback_config_path(&BindingAddress::parse(raw));
        assert_eq!(p("producto-x.precio.fam"), "custom_product_overrides.x.precio.fam");
        assert_eq!(p("menu.pizzas.x.nombre"), "config.menu.pizzas.x.nombre");
        assert_eq!(p("testimonio-ana.texto"), "testimonios.ana.texto");
        assert_eq!(p("pricing.plan"), "config.pricing.plan");
        assert_eq!(p(" pricing.plan "), "config.pricing.plan");
        assert_eq!(p("testimonios-config.titulo"), "testimonios_config.titulo");
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Pizzería  Don_Pepe! "), "pizzeria-don-pepe");
        assert_eq!(normalize_name("ÑANDÚ"), "nandu");
        assert_eq!(normalize_name("--"), "");
    }
}
