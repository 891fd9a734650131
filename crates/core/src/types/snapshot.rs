//! The in-memory copy of one store's remote state.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::product::Product;
use super::store::Store;
use super::testimonial::Testimonial;

/// Backend table names accepted by the write endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Tiendas,
    Productos,
    Testimonios,
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tiendas => write!(f, "tiendas"),
            Self::Productos => write!(f, "productos"),
            Self::Testimonios => write!(f, "testimonios"),
        }
    }
}

/// Store, products and testimonials as last fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StoreSnapshot {
    #[serde(rename = "tienda")]
    pub store: Store,
    #[serde(rename = "productos", default)]
    pub products: Vec<Product>,
    #[serde(rename = "testimonios", default)]
    pub testimonials: Vec<Testimonial>,
}

impl StoreSnapshot {
    /// Cheap structural hash used to skip re-hydration when nothing changed.
    #[must_use]
    pub fn structural_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        serde_json::to_string(self)
            .unwrap_or_default()
            .hash(&mut hasher);
        hasher.finish()
    }

    /// Update a product by id, or append it when unknown.
    pub fn upsert_product(&mut self, product: Product) {
        match self.products.iter_mut().find(|p| p.id == product.id) {
            Some(existing) => *existing = product,
            None => self.products.push(product),
        }
    }

    /// Update a testimonial by id, or append it when unknown.
    pub fn upsert_testimonial(&mut self, testimonial: Testimonial) {
        match self
            .testimonials
            .iter_mut()
            .find(|t| t.id == testimonial.id)
        {
            Some(existing) => *existing = testimonial,
            None => self.testimonials.push(testimonial),
        }
    }
}
