//! Core types for Mineiro.
//!
//! This module provides the typed shape of the data the engine reads from
//! the backend, plus small value types used while rendering it.

pub mod id;
pub mod lenient;
pub mod price;
pub mod product;
pub mod snapshot;
pub mod status;
pub mod store;
pub mod testimonial;

pub use id::*;
pub use price::{Price, PriceError};
pub use product::{Product, ProductConfiguration, Variant};
pub use snapshot::{StoreSnapshot, Table};
pub use status::*;
pub use store::Store;
pub use testimonial::Testimonial;
