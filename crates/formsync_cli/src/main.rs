//! FormSync CLI
//!
//! Command-line tools for inspecting and syncing a FormSync store.
//!
//! # Commands
//!
//! - `pending` - List responses waiting to be pushed
//! - `ledger` - Dump status ledger entries
//! - `sweep` - Remove synced responses past the retention window
//! - `sync` - Run sync cycles against a forms server

mod client;
mod commands;
mod error;

use clap::{Parser, Subcommand};
use error::CliError;
use formsync_engine::SyncConfig;
use formsync_store::{FileBackend, LocalStore};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// FormSync command-line tools.
#[derive(Parser)]
#[command(name = "formsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store snapshot
    #[arg(global = true, short, long)]
    store: Option<PathBuf>,

    /// Path to a JSON sync configuration
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List responses waiting to be pushed
    Pending {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Dump status ledger entries
    Ledger {
        /// Only show entries of this collection
        #[arg(long)]
        collection: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Remove synced responses past the retention window
    Sweep {
        /// Retention window in seconds (overrides the configuration)
        #[arg(short, long)]
        retention: Option<f64>,

        /// Dry run - show what would be removed
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Run sync cycles against a forms server
    Sync {
        /// Server URL (overrides the configuration)
        #[arg(long)]
        server: Option<String>,

        /// App slug (overrides the configuration)
        #[arg(long)]
        app: Option<String>,

        /// Signed-in user
        #[arg(short, long)]
        user: String,

        /// Keep syncing on the configured interval until interrupted
        #[arg(short, long)]
        watch: bool,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match &cli.config {
        Some(path) => SyncConfig::from_json_file(path)?,
        None => SyncConfig::default(),
    };

    match cli.command {
        Commands::Pending { format } => {
            let store = open_store(cli.store.as_deref(), "pending")?;
            commands::pending::run(store, &format)?;
        }
        Commands::Ledger { collection, format } => {
            let store = open_store(cli.store.as_deref(), "ledger")?;
            commands::ledger::run(&store, collection.as_deref(), &format)?;
        }
        Commands::Sweep { retention, dry_run } => {
            let store = open_store(cli.store.as_deref(), "sweep")?;
            let retention = match retention {
                Some(secs) => Duration::try_from_secs_f64(secs)
                    .map_err(|e| CliError::Usage(format!("invalid retention: {e}")))?,
                None => config.retention,
            };
            commands::sweep::run(store, retention, dry_run)?;
        }
        Commands::Sync {
            server,
            app,
            user,
            watch,
        } => {
            let store = open_store(cli.store.as_deref(), "sync")?;
            let mut config = config;
            if let Some(server) = server {
                config.server_url = server;
            }
            if let Some(app) = app {
                config.app_slug = app;
            }
            commands::sync::run(store, config, user, watch).await?;
        }
        Commands::Version => {
            println!("FormSync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

fn open_store(path: Option<&Path>, command: &str) -> Result<LocalStore, CliError> {
    let path = path.ok_or_else(|| CliError::Usage(format!("store path required for {command}")))?;
    Ok(LocalStore::open(Box::new(FileBackend::open(path)?))?)
}
