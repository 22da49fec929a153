//! `nanodata data` - fetch, inspect and remove datasets

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use comfy_table::{Cell, Color};

use nanodata_core::sources::{GeneratorSource, LocalSource, UrlSource, DEFAULT_SPLIT};
use nanodata_core::{
    builtin_sources, builtin_transforms, fmt_bytes, fmt_num, DataSource, Dataset, PipelineFile,
    Repository, SharedProgress,
};

use super::{open_repository, table};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct DataArgs {
    #[command(subcommand)]
    pub action: DataAction,
}

#[derive(Subcommand, Debug)]
pub enum DataAction {
    /// List aliases and the datasets they point to
    List,
    /// Show splits, schema and metadata of a dataset
    Show {
        /// Alias or content hash
        target: String,
    },
    /// Download a parquet file over HTTP and register it
    Pull {
        alias: String,
        url: String,

        /// Split the file is stored as
        #[arg(long, default_value = DEFAULT_SPLIT)]
        split: String,

        /// Tag the data with this mime type
        #[arg(long)]
        mime_type: Option<String>,
    },
    /// Run a command that writes {split}/*.parquet into the directory given
    /// as its last argument, and register the output
    Generate {
        alias: String,

        /// Command and arguments, after `--`
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
    /// Import parquet files from disk
    Import {
        alias: String,

        /// A {split}/*.parquet directory or a single parquet file
        path: PathBuf,

        /// Tag the data with this mime type
        #[arg(long)]
        mime_type: Option<String>,
    },
    /// Materialize a pipeline file
    Run {
        /// Path to the pipeline TOML
        pipeline: PathBuf,

        /// Alias for the result (overrides the file's `alias`)
        #[arg(long)]
        alias: Option<String>,
    },
    /// Remove aliases and delete data no alias refers to anymore
    Remove {
        #[arg(required = true)]
        aliases: Vec<String>,

        /// Only drop the aliases, keep the data
        #[arg(long)]
        keep: bool,
    },
}

pub fn run(args: DataArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    let repo = open_repository(config, progress)?;
    match args.action {
        DataAction::List => list(&repo),
        DataAction::Show { target } => show(&repo, &target),
        DataAction::Pull {
            alias,
            url,
            split,
            mime_type,
        } => {
            let mut source = UrlSource::new(url).with_split(split);
            if let Some(mime) = mime_type {
                source = source.with_mime_type(mime);
            }
            fetch_and_register(&repo, &source, &alias)
        }
        DataAction::Generate { alias, command } => {
            let Some((program, args)) = command.split_first() else {
                bail!("no command given");
            };
            let source = GeneratorSource::new(program.as_str(), args.iter().cloned());
            fetch_and_register(&repo, &source, &alias)
        }
        DataAction::Import {
            alias,
            path,
            mime_type,
        } => {
            let source = LocalSource::new(&path, mime_type)
                .with_context(|| format!("failed to read {}", path.display()))?;
            fetch_and_register(&repo, &source, &alias)
        }
        DataAction::Run { pipeline, alias } => run_pipeline(&repo, &pipeline, alias),
        DataAction::Remove { aliases, keep } => remove(&repo, &aliases, keep),
    }
}

fn fetch_and_register(repo: &Repository, source: &dyn DataSource, alias: &str) -> Result<()> {
    // Fail before doing any work if the alias is taken by something else
    let existing = repo.registry().get(alias)?;
    let hash = source.content_hash();
    if let Some(existing) = existing {
        if existing != hash {
            bail!(
                "alias '{alias}' already points to {}; remove it first",
                existing.short()
            );
        }
    }

    let data = repo
        .fetch_source(source)
        .with_context(|| format!("failed to fetch {}", source.describe()))?;
    if existing.is_none() {
        repo.register(alias, &data.hash())?;
    }
    eprintln!("{alias} -> {}", data.hash());
    print_splits(&data)
}

fn run_pipeline(repo: &Repository, path: &Path, alias: Option<String>) -> Result<()> {
    let file = PipelineFile::load(path)?;
    let pipeline = file
        .build(&builtin_sources(), &builtin_transforms())
        .with_context(|| format!("invalid pipeline {}", path.display()))?;

    for (i, hash) in pipeline.stage_hashes().iter().enumerate() {
        let cached = if repo.lookup(hash)?.is_some() {
            "cached"
        } else {
            "pending"
        };
        log::info!("stage {i}: {} [{cached}]", hash.short());
    }

    match alias.or(file.alias) {
        Some(alias) => fetch_and_register(repo, &pipeline, &alias),
        None => {
            let data = repo
                .fetch_source(&pipeline)
                .with_context(|| format!("failed to run {}", path.display()))?;
            eprintln!("{}", data.hash());
            print_splits(&data)
        }
    }
}

fn list(repo: &Repository) -> Result<()> {
    let aliases = repo.aliases()?;
    if aliases.is_empty() {
        eprintln!("No datasets registered.");
        return Ok(());
    }

    let mut table = table(&["Alias", "Hash", "Splits", "Rows", "Size", "Type"]);
    for (alias, hash) in &aliases {
        let Some(data) = repo.lookup(hash)? else {
            table.add_row(vec![
                Cell::new(alias),
                Cell::new(hash.short()),
                Cell::new("missing").fg(Color::Red),
            ]);
            continue;
        };
        let infos = data.split_infos()?;
        let rows: u64 = infos.iter().map(|s| s.size).sum();
        let bytes: u64 = infos.iter().map(|s| s.content_size).sum();
        let splits: Vec<&str> = infos.iter().map(|s| s.name.as_str()).collect();
        let mime = infos
            .iter()
            .find_map(|s| s.mime_type())
            .unwrap_or("-")
            .to_string();
        table.add_row(vec![
            Cell::new(alias),
            Cell::new(hash.short()),
            Cell::new(splits.join(", ")),
            Cell::new(fmt_num(rows)),
            Cell::new(fmt_bytes(bytes)),
            Cell::new(mime),
        ]);
    }

    eprintln!("\n{table}");
    eprintln!("{} datasets", aliases.len());
    Ok(())
}

fn show(repo: &Repository, target: &str) -> Result<()> {
    let data = repo.resolve(target)?;
    let aliases = repo.registry().aliases_for(&data.hash())?;

    eprintln!("hash:    {}", data.hash());
    eprintln!("path:    {}", data.root().display());
    if !aliases.is_empty() {
        eprintln!("aliases: {}", aliases.join(", "));
    }
    let aux = data.aux_files()?;
    if !aux.is_empty() {
        eprintln!("aux:     {} files", aux.len());
    }
    print_splits(&data)?;

    for info in data.split_infos()? {
        let mut fields = table(&["Field", "Type", "Nullable", "Metadata"]);
        for field in info.schema.fields() {
            let mut meta: Vec<String> = field
                .metadata()
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            meta.sort();
            fields.add_row(vec![
                field.name().to_string(),
                field.data_type().to_string(),
                field.is_nullable().to_string(),
                meta.join("\n"),
            ]);
        }
        eprintln!("\n[{}]", info.name);
        eprintln!("{fields}");
        let mut meta: Vec<_> = info.schema.metadata().iter().collect();
        meta.sort();
        for (key, value) in meta {
            eprintln!("  {key} = {}", truncate(value, 80));
        }
    }
    Ok(())
}

fn print_splits(data: &Dataset) -> Result<()> {
    let mut table = table(&["Split", "Rows", "Size", "Shards", "Type"]);
    for info in data.split_infos()? {
        let shards = data.split(&info.name)?.num_shards();
        table.add_row(vec![
            Cell::new(&info.name),
            Cell::new(fmt_num(info.size)),
            Cell::new(fmt_bytes(info.content_size)),
            Cell::new(shards),
            Cell::new(info.mime_type().unwrap_or("-")),
        ]);
    }
    eprintln!("\n{table}");
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((i, _)) => format!("{}...", &s[..i]),
        None => s.to_string(),
    }
}

fn remove(repo: &Repository, aliases: &[String], keep: bool) -> Result<()> {
    for alias in aliases {
        repo.registry()
            .get(alias)?
            .with_context(|| format!("unknown alias '{alias}'"))?;
    }
    for alias in aliases {
        if let Some(hash) = repo.deregister(alias)? {
            eprintln!("Removed {alias} ({})", hash.short());
        }
    }
    if keep {
        return Ok(());
    }

    let removed = repo.gc()?;
    if !removed.is_empty() {
        eprintln!("Deleted {} unreferenced datasets", removed.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_long_values() {
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("abc", 3), "abc");
    }

    #[test]
    fn generate_requires_separator() {
        use clap::Parser;

        #[derive(Parser)]
        struct Wrapper {
            #[command(subcommand)]
            action: DataAction,
        }

        let parsed =
            Wrapper::try_parse_from(["t", "generate", "toy", "--", "python", "make.py", "-n", "3"])
                .unwrap();
        match parsed.action {
            DataAction::Generate { alias, command } => {
                assert_eq!(alias, "toy");
                assert_eq!(command, vec!["python", "make.py", "-n", "3"]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(Wrapper::try_parse_from(["t", "generate", "toy"]).is_err());
    }
}
