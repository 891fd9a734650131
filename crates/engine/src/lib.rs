//! Mineiro Engine - Content binding and hydration.
//!
//! Keeps the bound elements of a third-party page in sync with a store's
//! Mineiro content, and lets an operator edit that content in place.
//!
//! # Architecture
//!
//! The engine never touches a browser or a socket directly. The host page is
//! reached through the [`dom::Document`] port, the backend through
//! [`api::Backend`] and [`api::ChangeFeed`], and client-side persistence
//! through [`preserved::KeyValueStore`]. [`EngineSession`] owns all state for
//! one page.
//!
//! # Modules
//!
//! - [`address`] - Binding address parsing
//! - [`resolve`] - Address resolution against a snapshot
//! - [`apply`] - Writing values into elements
//! - [`hydrate`] - Hydration passes and original-markup capture
//! - [`watcher`] - Re-hydration after host re-renders
//! - [`sync`] - Push and poll reconciliation
//! - [`guard`] - Protection of fresh local edits
//! - [`edit`], [`richtext`], [`writeback`] - Inline editing and inverse writes
//! - [`history`] - Undo
//! - [`preserved`] - Addresses kept at their original markup
//! - [`api`] - Backend ports and the HTTP client
//! - [`config`], [`error`] - Configuration and errors

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod address;
pub mod api;
pub mod apply;
pub mod config;
pub mod dom;
pub mod edit;
pub mod error;
pub mod guard;
pub mod history;
pub mod hydrate;
pub mod preserved;
pub mod resolve;
pub mod richtext;
pub mod session;
pub mod sync;
pub mod watcher;
pub mod writeback;

pub use address::BindingAddress;
pub use api::{Backend, ChangeFeed, MineiroClient};
pub use config::EngineConfig;
pub use dom::{Document, ElementId, MemoryDocument};
pub use edit::{EditError, EditPhase, EditorForm, Gesture};
pub use error::{EngineError, Result};
pub use hydrate::HydrationReport;
pub use session::{EngineSession, EngineSessionBuilder};
pub use sync::SyncOutcome;
