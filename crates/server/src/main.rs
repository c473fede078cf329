//! glimmer entry point.
//!
//! Syncs remote photo collections into the local content-addressed store and
//! serves pages from it. Results are printed to stdout as JSON; logging goes
//! to stderr so the two never mix.

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use glimmer_core::{AppConfig, CollectionKey};

mod commands;
mod error;

use commands::App;
use error::CommandError;

#[derive(Debug, Parser)]
#[command(name = "glimmer", version, about = "Local mirror of remote photo collections")]
struct Cli {
    /// Override the store root directory.
    #[arg(long, global = true, env = "GLIMMER_STORE_ROOT")]
    store_root: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Bring a collection up to date, refreshing only if stale.
    Sync {
        key: String,
        /// Fetch the remote listing even if the snapshot is fresh.
        #[arg(long)]
        force: bool,
    },
    /// Print one page of a collection, newest first.
    List {
        key: String,
        #[arg(long, default_value_t = 0)]
        page: usize,
        #[arg(long)]
        page_size: Option<usize>,
    },
    /// Remove collections not accessed recently, with their unshared blobs.
    Evict {
        #[arg(long)]
        days: Option<u64>,
    },
    /// Walk a collection through a shuffled view session.
    View {
        key: String,
        #[arg(long, default_value_t = 1)]
        pages: usize,
        /// Move the viewing position here after loading.
        #[arg(long)]
        seek: Option<usize>,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CommandError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(app: &App, command: Command) -> Result<(), CommandError> {
    match command {
        Command::Sync { key, force } => print_json(&commands::sync(app, &CollectionKey::new(key), force).await?),
        Command::List { key, page, page_size } => {
            print_json(&commands::list(app, &CollectionKey::new(key), page, page_size).await?)
        }
        Command::Evict { days } => print_json(&commands::evict(app, days).await?),
        Command::View { key, pages, seek } => {
            print_json(&commands::view(app, CollectionKey::new(key), pages, seek).await?)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load()?;
    if let Some(root) = cli.store_root {
        config.store_root = root;
    }

    let app = App::open(config).await?;

    if let Err(err) = run(&app, cli.command).await {
        tracing::error!(%err, "command failed");
        eprintln!("{err}");
        std::process::exit(err.exit_code());
    }

    Ok(())
}
