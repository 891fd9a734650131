//! Address and snapshot inspection commands.

use chrono::Utc;
use mineiro_engine::address::BindingAddress;
use mineiro_engine::api::{Backend, MineiroClient};
use mineiro_engine::config::EngineConfig;
use mineiro_engine::resolve::{fallback_config_path, resolve as resolve_address};
use serde_json::json;
use tracing::info;

use super::{CommandError, print_json};

/// Print the parsed descriptor of `raw`.
///
/// # Errors
///
/// Returns an error if stdout cannot be written.
pub fn parse(raw: &str) -> Result<(), CommandError> {
    let address = BindingAddress::parse(raw);
    print_json(&json!({
        "address": address,
        "canonical": address.to_string(),
        "field": address.field(),
    }))
}

/// Fetch and print the store snapshot.
///
/// # Errors
///
/// Returns an error if configuration is missing or the fetch fails.
pub async fn snapshot(slug: Option<String>) -> Result<(), CommandError> {
    let config = EngineConfig::from_env_with_slug(slug)?;
    let client = MineiroClient::new(&config)?;

    let snapshot = client
        .fetch_snapshot(&config.slug, config.hostname.as_deref())
        .await?;
    let status = snapshot.store.payment_state().status(Utc::now());
    info!(
        slug = %config.slug,
        products = snapshot.products.len(),
        testimonials = snapshot.testimonials.len(),
        ?status,
        "Snapshot fetched"
    );

    print_json(&snapshot)
}

/// Resolve `raw` against the store snapshot and print the value.
///
/// # Errors
///
/// Returns an error if configuration is missing or the fetch fails.
pub async fn resolve(raw: &str, slug: Option<String>) -> Result<(), CommandError> {
    let config = EngineConfig::from_env_with_slug(slug)?;
    let client = MineiroClient::new(&config)?;

    let snapshot = client
        .fetch_snapshot(&config.slug, config.hostname.as_deref())
        .await?;
    let address = BindingAddress::parse(raw);
    let value = resolve_address(&address, &snapshot);
    if value.is_none() {
        info!(address = %address, "Address did not resolve");
    }

    print_json(&json!({
        "address": address.to_string(),
        "value": value,
        "fallback": fallback_config_path(&address),
    }))
}
