//! Unified error handling for the engine.
//!
//! Each concern has its own `thiserror` enum next to the code that raises it;
//! [`EngineError`] wraps them for the session-level control surface.

use thiserror::Error;

use crate::api::ApiError;
use crate::apply::ApplyError;
use crate::config::ConfigError;
use crate::edit::EditError;
use crate::preserved::StorageError;

/// Engine-level error type.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Backend or push-channel operation failed.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Persisted client state could not be read or written.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A value could not be written to the document.
    #[error("Apply error: {0}")]
    Apply(#[from] ApplyError),

    /// Inline editing was used out of order.
    #[error("Edit error: {0}")]
    Edit(#[from] EditError),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The store's account is suspended; only the banner is rendered.
    #[error("Store {0} is suspended")]
    Suspended(String),

    /// No snapshot has been loaded yet.
    #[error("No snapshot loaded")]
    NoSnapshot,

    /// The change history is empty.
    #[error("Nothing to undo")]
    NothingToUndo,
}

/// Result type alias for `EngineError`.
pub type Result<T> = std::result::Result<T, EngineError>;
