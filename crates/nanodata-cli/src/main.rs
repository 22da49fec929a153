//! nanodata - content-addressed dataset cache
//!
//! Pulls, imports and generates tabular datasets into a local store keyed
//! by how they were produced, and manages human-readable aliases over it.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "nanodata")]
#[command(about = "Content-addressed dataset cache and pipelines")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file path (default: ./nanodata.toml or ~/.config/nanodata/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Repository root (default: per-user cache directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Read timeout in seconds for stall detection
    #[arg(long, global = true)]
    read_timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch, list and remove datasets
    Data(cmd::data::DataArgs),
    /// Inspect and maintain the content store
    Store(cmd::store::StoreArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(nanodata_core::ProgressContext::new());

    // Logging goes through the progress bars on a TTY, plain stderr otherwise
    let multi = progress.is_tty().then(|| progress.multi());
    nanodata_core::init_logging(cli.quiet, cli.debug, multi);

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    if let Some(root) = cli.root {
        config.repository.root = Some(root);
    }
    if let Some(secs) = cli.read_timeout {
        config.http.read_timeout = secs;
    }
    config.validate()?;
    nanodata_core::set_http_config(config.http);

    match cli.command {
        Command::Data(args) => cmd::data::run(args, &config, &progress),
        Command::Store(args) => cmd::store::run(args, &config),
        Command::Config => cmd::show_config(&config),
    }
}
