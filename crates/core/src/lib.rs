//! Mineiro Core - Shared data model.
//!
//! This crate provides the types the binding engine and its tools share:
//! - `engine` - Client-side binding/hydration engine
//! - `cli` - Operator tooling for inspecting stores and bindings
//!
//! # Architecture
//!
//! The core crate contains only types and pure helpers - no I/O, no HTTP
//! clients, no DOM access. This keeps it lightweight and allows it to be used
//! anywhere.
//!
//! # Modules
//!
//! - [`types`] - Store snapshot, product, testimonial, price and account types
//! - [`path`] - Dot-path access into loosely typed JSON documents

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod path;
pub mod types;

pub use types::*;
