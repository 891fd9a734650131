//! Preserved-originals management commands.

use std::path::PathBuf;

use mineiro_engine::preserved::{FileStore, PreservedOriginals};
use tracing::info;

use super::{CommandError, print_json};

/// Print every preserved address.
///
/// # Errors
///
/// Returns an error if the state directory cannot be read.
pub fn list(state_dir: PathBuf) -> Result<(), CommandError> {
    let preserved = PreservedOriginals::load(Box::new(FileStore::new(state_dir)))?;
    let addresses: Vec<&str> = preserved.iter().collect();
    print_json(&addresses)
}

/// Forget every preserved address, so they hydrate again on next load.
///
/// # Errors
///
/// Returns an error if the state directory cannot be written.
pub fn clear(state_dir: PathBuf) -> Result<(), CommandError> {
    let mut preserved = PreservedOriginals::load(Box::new(FileStore::new(state_dir)))?;
    let count = preserved.len();
    preserved.clear()?;
    info!(count, "Preserved originals cleared");
    Ok(())
}
