//! Engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `MINEIRO_API_BASE_URL` - Base URL of the Mineiro API (e.g. `https://app.mineiro.cl/api`)
//! - `MINEIRO_SLUG` - Slug of the store whose page is being bound
//!
//! ## Optional
//! - `MINEIRO_HOSTNAME` - Hostname of the host page, sent with snapshot fetches
//! - `MINEIRO_API_TOKEN` - Bearer token for the write endpoint (editing sessions only)
//! - `MINEIRO_UPLOAD_URL` - Image upload endpoint (default: `{base}/upload`)
//! - `MINEIRO_BILLING_URL` - Billing page linked from the suspension banner
//! - `MINEIRO_BIND_ATTRIBUTE` - Address attribute (default: `data-mineiro-bind`)
//! - `MINEIRO_ADMIN_FLAG` - Query/fragment flag enabling the editor (default: `mineiro-admin`)
//! - `MINEIRO_POLL_INTERVAL_MS` - Poll interval (default: 5000)
//! - `MINEIRO_PUSH_TIMEOUT_MS` - Push channel confirmation timeout (default: 5000)
//! - `MINEIRO_DEBOUNCE_MS` - Mutation watcher debounce (default: 100)
//! - `MINEIRO_GUARD_WINDOW_SECS` - Local edit protection window (default: 30)
//! - `MINEIRO_HISTORY_CAP` - Undo history capacity (default: 50)
//! - `MINEIRO_STATE_DIR` - Directory for persisted client state (default: in-memory)
//! - `MINEIRO_DEFAULT_SIZES` - Comma-separated size tokens that also update the flat price
//!   (default: `fam,familiar,default`)

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

/// Default address attribute adopted by the engine.
pub const DEFAULT_BIND_ATTRIBUTE: &str = "data-mineiro-bind";

/// Default query/fragment flag that enables the editing UI.
pub const DEFAULT_ADMIN_FLAG: &str = "mineiro-admin";

/// Default billing page linked from the suspension banner.
pub const DEFAULT_BILLING_URL: &str = "https://app.mineiro.cl/dashboard/facturacion";

const DEFAULT_SIZE_TOKENS: &[&str] = &["fam", "familiar", "default"];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Timers driving background reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingConfig {
    /// Interval between snapshot polls when the push channel is unavailable.
    pub poll_interval: Duration,
    /// How long to wait for the push channel to confirm its subscription.
    pub push_confirm_timeout: Duration,
    /// Quiet period before the mutation watcher re-hydrates.
    pub debounce: Duration,
    /// How long a local edit is protected from remote reconciliation.
    pub guard_window: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            push_confirm_timeout: Duration::from_secs(5),
            debounce: Duration::from_millis(100),
            guard_window: Duration::from_secs(30),
        }
    }
}

/// Binding engine configuration.
///
/// Implements `Debug` manually to redact the API token.
#[derive(Clone)]
pub struct EngineConfig {
    /// Base URL of the Mineiro API.
    pub api_base_url: Url,
    /// Slug of the bound store.
    pub slug: String,
    /// Hostname of the host page.
    pub hostname: Option<String>,
    /// Bearer token for writes.
    pub api_token: Option<SecretString>,
    /// Image upload endpoint.
    pub upload_url: Option<Url>,
    /// Billing page linked from the suspension banner.
    pub billing_url: String,
    /// Attribute carrying binding addresses.
    pub bind_attribute: String,
    /// Query/fragment flag that enables the editor.
    pub admin_flag: String,
    /// Background timers.
    pub timing: TimingConfig,
    /// Maximum number of undoable edits kept.
    pub history_capacity: usize,
    /// Size tokens whose sized-price writes also update the flat price.
    pub default_size_tokens: Vec<String>,
    /// Directory for persisted client state; `None` keeps it in memory.
    pub state_dir: Option<PathBuf>,
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("api_base_url", &self.api_base_url.as_str())
            .field("slug", &self.slug)
            .field("hostname", &self.hostname)
            .field(
                "api_token",
                &self.api_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("upload_url", &self.upload_url.as_ref().map(Url::as_str))
            .field("billing_url", &self.billing_url)
            .field("bind_attribute", &self.bind_attribute)
            .field("admin_flag", &self.admin_flag)
            .field("timing", &self.timing)
            .field("history_capacity", &self.history_capacity)
            .field("default_size_tokens", &self.default_size_tokens)
            .field("state_dir", &self.state_dir)
            .finish()
    }
}

impl EngineConfig {
    /// Configuration with defaults for everything but the API and store.
    #[must_use]
    pub fn new(api_base_url: Url, slug: impl Into<String>) -> Self {
        Self {
            api_base_url,
            slug: slug.into(),
            hostname: None,
            api_token: None,
            upload_url: None,
            billing_url: DEFAULT_BILLING_URL.to_string(),
            bind_attribute: DEFAULT_BIND_ATTRIBUTE.to_string(),
            admin_flag: DEFAULT_ADMIN_FLAG.to_string(),
            timing: TimingConfig::default(),
            history_capacity: 50,
            default_size_tokens: DEFAULT_SIZE_TOKENS.iter().map(ToString::to_string).collect(),
            state_dir: None,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with_slug(None)
    }

    /// Load configuration from environment variables, taking the store slug
    /// from `slug` when given instead of `MINEIRO_SLUG`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env_with_slug(slug: Option<String>) -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_base_url = parse_env::<Url>(
            "MINEIRO_API_BASE_URL",
            &get_required_env("MINEIRO_API_BASE_URL")?,
        )?;
        let slug = slug.map_or_else(|| get_required_env("MINEIRO_SLUG"), Ok)?;

        let mut config = Self::new(api_base_url, slug);
        config.hostname = get_optional_env("MINEIRO_HOSTNAME");
        config.api_token = get_optional_env("MINEIRO_API_TOKEN").map(SecretString::from);
        config.upload_url = get_optional_env("MINEIRO_UPLOAD_URL")
            .map(|v| parse_env::<Url>("MINEIRO_UPLOAD_URL", &v))
            .transpose()?;
        if let Some(billing) = get_optional_env("MINEIRO_BILLING_URL") {
            config.billing_url = billing;
        }
        if let Some(attribute) = get_optional_env("MINEIRO_BIND_ATTRIBUTE") {
            config.bind_attribute = attribute;
        }
        if let Some(flag) = get_optional_env("MINEIRO_ADMIN_FLAG") {
            config.admin_flag = flag;
        }

        config.timing = TimingConfig {
            poll_interval: get_millis("MINEIRO_POLL_INTERVAL_MS", config.timing.poll_interval)?,
            push_confirm_timeout: get_millis(
                "MINEIRO_PUSH_TIMEOUT_MS",
                config.timing.push_confirm_timeout,
            )?,
            debounce: get_millis("MINEIRO_DEBOUNCE_MS", config.timing.debounce)?,
            guard_window: get_optional_env("MINEIRO_GUARD_WINDOW_SECS")
                .map(|v| parse_env::<u64>("MINEIRO_GUARD_WINDOW_SECS", &v).map(Duration::from_secs))
                .transpose()?
                .unwrap_or(config.timing.guard_window),
        };

        if let Some(cap) = get_optional_env("MINEIRO_HISTORY_CAP") {
            config.history_capacity = parse_env("MINEIRO_HISTORY_CAP", &cap)?;
        }
        if let Some(sizes) = get_optional_env("MINEIRO_DEFAULT_SIZES") {
            config.default_size_tokens = sizes
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
        }
        config.state_dir = get_optional_env("MINEIRO_STATE_DIR").map(PathBuf::from);

        Ok(config)
    }

    /// Upload endpoint, defaulting to `{api_base_url}/upload`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL cannot be joined.
    pub fn upload_endpoint(&self) -> Result<Url, url::ParseError> {
        self.upload_url
            .clone()
            .map_or_else(|| endpoint(&self.api_base_url, "upload"), Ok)
    }

    /// Whether `size` is one of the default size tokens.
    #[must_use]
    pub fn is_default_size(&self, size: &str) -> bool {
        let size = size.trim().to_lowercase();
        self.default_size_tokens.iter().any(|t| *t == size)
    }
}

/// Join `path` onto `base`, keeping the base's own path segments.
///
/// # Errors
///
/// Returns an error if the joined URL is invalid.
pub fn endpoint(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        base.set_path(&format!("{}/", base.path()));
    }
    base.join(path)
}

/// Whether the host page URL asks for the editing UI.
///
/// The flag may appear as a query parameter (`?mineiro-admin`) or as the
/// fragment (`#mineiro-admin`).
#[must_use]
pub fn admin_mode_requested(page_url: &Url, flag: &str) -> bool {
    page_url.query_pairs().any(|(key, _)| key == flag)
        || page_url
            .fragment()
            .is_some_and(|f| f.trim_start_matches('/').split(['&', '?']).any(|part| part == flag))
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse an environment value, naming the variable on failure.
fn parse_env<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Read a millisecond duration, falling back to `default`.
fn get_millis(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    get_optional_env(key).map_or(Ok(default), |v| {
        parse_env::<u64>(key, &v).map(Duration::from_millis)
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://app.mineiro.cl/api").unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::new(base(), "don-pepe");
        assert_eq!(config.bind_attribute, "data-mineiro-bind");
        assert_eq!(config.timing.guard_window, Duration::from_secs(30));
        assert_eq!(config.timing.poll_interval, Duration::from_secs(5));
        assert_eq!(config.timing.debounce, Duration::from_millis(100));
        assert_eq!(config.history_capacity, 50);
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        assert_eq!(
            endpoint(&base(), "tienda").unwrap().as_str(),
            "https://app.mineiro.cl/api/tienda"
        );
        assert_eq!(
            EngineConfig::new(base(), "x").upload_endpoint().unwrap().as_str(),
            "https://app.mineiro.cl/api/upload"
        );
    }

    #[test]
    fn test_default_size_tokens() {
        let config = EngineConfig::new(base(), "x");
        assert!(config.is_default_size("fam"));
        assert!(config.is_default_size(" Familiar "));
        assert!(!config.is_default_size("ind"));
    }

    #[test]
    fn test_admin_mode_requested() {
        let flag = DEFAULT_ADMIN_FLAG;
        assert!(admin_mode_requested(
            &Url::parse("https://pizzeria.cl/?mineiro-admin").unwrap(),
            flag
        ));
        assert!(admin_mode_requested(
            &Url::parse("https://pizzeria.cl/menu#mineiro-admin").unwrap(),
            flag
        ));
        assert!(!admin_mode_requested(
            &Url::parse("https://pizzeria.cl/?utm=mineiro").unwrap(),
            flag
        ));
    }

    #[test]
    fn test_debug_redacts_token() {
        let mut config = EngineConfig::new(base(), "x");
        config.api_token = Some(SecretString::from("super_secret_token_value"));
        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_token_value"));
    }
}
