//! warp-blob CLI - inspect and convert blob databases

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use warp_tensor::{DbBackend, TensorConfig};

mod commands;

#[derive(Parser)]
#[command(name = "warp-blob")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Database backend (sled, minidb); defaults to the configured backend
    #[arg(short, long, global = true)]
    backend: Option<DbBackend>,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the blobs stored in a database
    List {
        /// Database path
        db: PathBuf,
    },
    /// Show one blob's metadata and leading values
    Show {
        /// Database path
        db: PathBuf,
        /// Blob name
        name: String,
        /// Number of values to print
        #[arg(short, long, default_value = "16")]
        limit: usize,
    },
    /// Copy every blob into a database of another backend
    Convert {
        /// Source database path
        src: PathBuf,
        /// Destination database path
        dst: PathBuf,
        /// Source backend
        #[arg(long)]
        from: DbBackend,
        /// Destination backend
        #[arg(long)]
        to: DbBackend,
    },
}

fn load_config(path: Option<&Path>) -> Result<TensorConfig> {
    let config = match path {
        Some(path) => TensorConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => {
            let mut config = TensorConfig::default();
            config
                .apply_env_overrides()
                .context("Invalid WARP_TENSOR_* environment")?;
            config
        }
    };
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config(cli.config.as_deref())?;
    let backend = cli.backend.unwrap_or(config.default_backend);
    tracing::debug!(%backend, root = %config.root_path.display(), "Configuration loaded");

    match cli.command {
        Commands::List { db } => commands::list::execute(&db, backend, &config),
        Commands::Show { db, name, limit } => {
            commands::show::execute(&db, &name, limit, backend, &config)
        }
        Commands::Convert { src, dst, from, to } => {
            commands::convert::execute(&src, &dst, from, to, &config)
        }
    }
}
