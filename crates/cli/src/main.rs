//! Mineiro CLI - Inspect bindings and watch a store's content.
//!
//! # Usage
//!
//! ```bash
//! # Show how an address is parsed
//! mineiro parse producto-napolitana-tamano-grande.precio
//!
//! # Fetch the store snapshot
//! mineiro snapshot --slug pizzeria-don-pepe
//!
//! # Resolve an address against the live snapshot
//! mineiro resolve hero.titulo --slug pizzeria-don-pepe
//!
//! # Keep a session in sync until Ctrl-C
//! mineiro watch
//!
//! # Inspect or reset the preserved-originals set
//! mineiro preserved list
//! mineiro preserved clear
//! ```
//!
//! # Commands
//!
//! - `parse` - Parse a binding address
//! - `snapshot` - Fetch and print the store snapshot
//! - `resolve` - Resolve an address against the store snapshot
//! - `watch` - Run a headless engine session
//! - `preserved` - Manage persisted preserved originals

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "mineiro")]
#[command(author, version, about = "Mineiro CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a binding address and print its descriptor
    Parse {
        /// Raw address, as written in the bind attribute
        address: String,
    },
    /// Fetch and print the store snapshot
    Snapshot {
        /// Store slug (defaults to `MINEIRO_SLUG`)
        #[arg(short, long)]
        slug: Option<String>,
    },
    /// Resolve an address against the store snapshot
    Resolve {
        /// Raw address, as written in the bind attribute
        address: String,

        /// Store slug (defaults to `MINEIRO_SLUG`)
        #[arg(short, long)]
        slug: Option<String>,
    },
    /// Run a headless engine session until Ctrl-C
    Watch {
        /// Store slug (defaults to `MINEIRO_SLUG`)
        #[arg(short, long)]
        slug: Option<String>,
    },
    /// Manage the preserved-originals set
    Preserved {
        /// Directory holding persisted client state
        #[arg(long, env = "MINEIRO_STATE_DIR")]
        state_dir: PathBuf,

        #[command(subcommand)]
        action: PreservedAction,
    },
}

#[derive(Subcommand)]
enum PreservedAction {
    /// List preserved addresses
    List,
    /// Forget every preserved address
    Clear,
}

#[tokio::main]
async fn main() {
    // Load .env before Sentry so SENTRY_DSN is visible
    let _ = dotenvy::dotenv();

    let _sentry_guard = init_sentry();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mineiro_cli=info,mineiro_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Parse { address } => commands::inspect::parse(&address)?,
        Commands::Snapshot { slug } => commands::inspect::snapshot(slug).await?,
        Commands::Resolve { address, slug } => commands::inspect::resolve(&address, slug).await?,
        Commands::Watch { slug } => commands::watch::run(slug).await?,
        Commands::Preserved { state_dir, action } => match action {
            PreservedAction::List => commands::preserved::list(state_dir)?,
            PreservedAction::Clear => commands::preserved::clear(state_dir)?,
        },
    }
    Ok(())
}

/// Initialize Sentry when `SENTRY_DSN` is set.
fn init_sentry() -> Option<sentry::ClientInitGuard> {
    let dsn = std::env::var("SENTRY_DSN").ok().filter(|dsn| !dsn.is_empty())?;

    let guard = sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: std::env::var("SENTRY_ENVIRONMENT").ok().map(Into::into),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Errors and warnings become Sentry events, info and debug become breadcrumbs.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        tracing::Level::TRACE => sentry_tracing::EventFilter::Ignore,
    }
}
