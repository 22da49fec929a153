pub mod data;
pub mod store;

use std::sync::Arc;

use anyhow::{Context, Result};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use nanodata_core::{fmt_bytes, Repository, SharedProgress};

use crate::config::Config;

/// Rounded table with cyan headers.
pub fn table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(headers.iter().map(|h| Cell::new(h).fg(Color::Cyan)));
    table
}

pub fn open_repository(config: &Config, progress: &SharedProgress) -> Result<Repository> {
    let root = config.repository.resolve_root()?;
    let repo = Repository::open(&root, config.repository.store_options())
        .with_context(|| format!("failed to open repository at {}", root.display()))?;
    log::debug!("repository at {}", root.display());
    Ok(repo.with_progress(Arc::clone(progress)))
}

/// `nanodata config`
pub fn show_config(config: &Config) -> Result<()> {
    let repo = &config.repository;
    let root = match repo.resolve_root() {
        Ok(root) => root.display().to_string(),
        Err(_) => "unavailable".to_string(),
    };

    let mut table = table(&["Setting", "Value"]);
    table.add_row(vec!["Repository root", &root]);
    table.add_row(vec!["Shard size", &fmt_bytes(repo.shard_bytes)]);
    table.add_row(vec!["Compression level", &repo.zstd_level.to_string()]);
    table.add_row(vec!["Read batch size", &repo.batch_size.to_string()]);
    table.add_row(vec!["Wait timeout", &format!("{}s", repo.wait_timeout_secs)]);
    table.add_row(vec![
        "Read timeout",
        &format!("{}s", config.http.read_timeout),
    ]);
    table.add_row(vec![
        "Connect timeout",
        &format!("{}s", config.http.connect_timeout),
    ]);

    eprintln!("\n{table}");
    Ok(())
}
