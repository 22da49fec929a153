//! `nanodata store` - inspect and maintain the content store

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Subcommand};
use comfy_table::{Cell, Color};

use nanodata_core::{fmt_bytes, fmt_num, ProgressContext, Repository};
use nanodata_store::{ContentHash, EntryState, VerifyResult};

use super::{open_repository, table};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct StoreArgs {
    #[command(subcommand)]
    pub action: StoreAction,
}

#[derive(Subcommand, Debug)]
pub enum StoreAction {
    /// List store entries
    List,
    /// Verify file hashes against the manifests
    Verify {
        /// Alias or hash to verify (default: all)
        target: Option<String>,
    },
    /// Remove entries no alias refers to
    Gc {
        /// Actually delete (otherwise dry-run)
        #[arg(long)]
        confirm: bool,
    },
    /// Remove entries left incomplete by crashed writers
    Cleanup {
        /// Only entries older than this many seconds
        #[arg(long, default_value_t = 3600)]
        min_age_secs: u64,
    },
}

pub fn run(args: StoreArgs, config: &Config) -> Result<()> {
    let repo = open_repository(config, &Arc::new(ProgressContext::hidden()))?;
    match args.action {
        StoreAction::List => list(&repo),
        StoreAction::Verify { target } => verify(&repo, target.as_deref()),
        StoreAction::Gc { confirm } => gc(&repo, confirm),
        StoreAction::Cleanup { min_age_secs } => {
            let removed = repo
                .store()
                .cleanup_incomplete(Duration::from_secs(min_age_secs))?;
            eprintln!("Removed {removed} incomplete entries older than {min_age_secs}s.");
            Ok(())
        }
    }
}

fn list(repo: &Repository) -> Result<()> {
    let entries = repo.store().list(&repo.registry().referenced()?)?;
    if entries.is_empty() {
        eprintln!("Store is empty.");
        return Ok(());
    }

    let aliases = repo.aliases()?;
    let mut out = table(&["Hash", "State", "Splits", "Rows", "Size", "Created", "Aliases"]);
    for entry in &entries {
        let state = match entry.state {
            EntryState::Complete => Cell::new("complete").fg(Color::Green),
            EntryState::Pending => Cell::new("pending").fg(Color::Yellow),
        };
        let names = aliases
            .iter()
            .filter_map(|(alias, hash)| (*hash == entry.hash).then_some(alias.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        let names = if names.is_empty() {
            Cell::new("-").fg(Color::DarkGrey)
        } else {
            Cell::new(names)
        };
        out.add_row(vec![
            Cell::new(entry.hash.short()),
            state,
            Cell::new(entry.splits),
            Cell::new(fmt_num(entry.rows)),
            Cell::new(fmt_bytes(entry.bytes)),
            Cell::new(entry.created_at.as_str()),
            names,
        ]);
    }

    let total: u64 = entries.iter().map(|e| e.bytes).sum();
    eprintln!("\n{out}");
    eprintln!("{} entries, {}", entries.len(), fmt_bytes(total));
    Ok(())
}

fn gc(repo: &Repository, confirm: bool) -> Result<()> {
    if confirm {
        let removed = repo.gc()?;
        eprintln!("Deleted {} unreferenced entries.", removed.len());
        for hash in &removed {
            log::info!("deleted {hash}");
        }
        return Ok(());
    }

    let candidates: Vec<_> = repo
        .store()
        .list(&repo.registry().referenced()?)?
        .into_iter()
        .filter(|e| e.state == EntryState::Complete && !e.referenced)
        .collect();
    if candidates.is_empty() {
        eprintln!("Every complete entry has an alias; nothing to collect.");
        return Ok(());
    }

    let mut out = table(&["Hash", "Rows", "Size"]);
    for entry in &candidates {
        out.add_row(vec![
            Cell::new(entry.hash.short()),
            Cell::new(fmt_num(entry.rows)),
            Cell::new(fmt_bytes(entry.bytes)),
        ]);
    }
    let reclaim: u64 = candidates.iter().map(|e| e.bytes).sum();
    eprintln!("\n{out}");
    eprintln!(
        "{} entries ({}) have no alias. Pass --confirm to delete them.",
        candidates.len(),
        fmt_bytes(reclaim)
    );
    Ok(())
}

fn verify(repo: &Repository, target: Option<&str>) -> Result<()> {
    let checked: Vec<(ContentHash, Vec<VerifyResult>)> = match target {
        Some(target) => {
            let hash = repo.resolve_hash(target)?;
            let results = repo.store().verify(&hash)?;
            vec![(hash, results)]
        }
        None => repo.store().verify_all()?.into_iter().collect(),
    };
    if checked.is_empty() {
        eprintln!("Store is empty.");
        return Ok(());
    }

    let mut out = table(&["Hash", "Files", "Result"]);
    let mut failed = 0usize;
    for (hash, results) in &checked {
        let bad = results.iter().filter(|r| !r.ok).count();
        let cell = if bad == 0 {
            Cell::new("ok").fg(Color::Green)
        } else {
            failed += 1;
            Cell::new(format!("{bad} mismatched")).fg(Color::Red)
        };
        out.add_row(vec![Cell::new(hash.short()), Cell::new(results.len()), cell]);
    }
    eprintln!("\n{out}");

    for (hash, results) in &checked {
        for r in results.iter().filter(|r| !r.ok) {
            eprintln!(
                "{} {}: manifest {} != disk {}",
                hash.short(),
                r.path,
                abbrev(&r.expected),
                abbrev(&r.actual)
            );
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} entries failed verification", checked.len());
    }
    Ok(())
}

fn abbrev(hex: &str) -> &str {
    hex.get(..8).unwrap_or(hex)
}
