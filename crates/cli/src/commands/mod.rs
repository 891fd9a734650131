//! CLI command implementations.

pub mod inspect;
pub mod preserved;
pub mod watch;

use std::io::Write;

use mineiro_engine::api::ApiError;
use mineiro_engine::config::ConfigError;
use mineiro_engine::preserved::StorageError;
use mineiro_engine::EngineError;
use serde::Serialize;

/// Errors shared by the CLI commands.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Output error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Pretty-print `value` as JSON on stdout.
fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CommandError> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}
