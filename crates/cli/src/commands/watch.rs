//! Headless engine session.

use std::sync::Arc;

use mineiro_engine::config::EngineConfig;
use mineiro_engine::{EngineSession, MemoryDocument, MineiroClient};
use tracing::info;

use super::CommandError;

/// Start a session on an empty document and keep it synced until Ctrl-C.
///
/// Useful for watching the sync loop log snapshot changes for a store.
///
/// # Errors
///
/// Returns an error if configuration is missing or the initial fetch fails.
pub async fn run(slug: Option<String>) -> Result<(), CommandError> {
    let config = EngineConfig::from_env_with_slug(slug)?;
    let client = Arc::new(MineiroClient::new(&config)?);

    let session = EngineSession::builder(config, client, MemoryDocument::new()).build()?;
    let status = session.start().await?;
    info!(?status, "Session started, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;

    session.shutdown();
    info!(history = session.history_len(), "Session stopped");
    Ok(())
}
