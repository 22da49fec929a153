//! `nanodata.toml`: repository location, store tuning and HTTP timeouts

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use nanodata_core::{HttpConfig, Repository};
use nanodata_store::{
    StoreOptions, WriteOptions, DEFAULT_BATCH_SIZE, DEFAULT_SHARD_BYTES, DEFAULT_WAIT_TIMEOUT,
    DEFAULT_ZSTD_LEVEL,
};
use serde::Deserialize;

/// Global configuration for nanodata
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub repository: RepositoryConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Repository root; may be a `${VAR}` reference.
    #[serde(deserialize_with = "deserialize_env_path")]
    pub root: Option<PathBuf>,
    pub shard_bytes: u64,
    pub zstd_level: i32,
    pub batch_size: usize,
    pub wait_timeout_secs: u64,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            root: None,
            shard_bytes: DEFAULT_SHARD_BYTES,
            zstd_level: DEFAULT_ZSTD_LEVEL,
            batch_size: DEFAULT_BATCH_SIZE,
            wait_timeout_secs: DEFAULT_WAIT_TIMEOUT.as_secs(),
        }
    }
}

impl RepositoryConfig {
    /// Configured root, else the per-user cache directory.
    pub fn resolve_root(&self) -> Result<PathBuf> {
        self.root
            .clone()
            .or_else(Repository::default_root)
            .context("no cache directory available; set [repository] root or pass --root")
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            write: WriteOptions {
                shard_bytes: self.shard_bytes,
                zstd_level: self.zstd_level,
            },
            batch_size: self.batch_size,
            wait_timeout: Duration::from_secs(self.wait_timeout_secs),
        }
    }
}

fn deserialize_env_path<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(expand_path))
}

/// `${VAR}` becomes the variable's value (none if unset) and a leading
/// `~/` the home directory. Anything else is taken literally.
fn expand_path(raw: &str) -> Option<PathBuf> {
    if let Some(name) = raw.strip_prefix("${").and_then(|r| r.strip_suffix('}')) {
        return std::env::var_os(name).map(PathBuf::from);
    }
    if let Some(rest) = raw.strip_prefix("~/") {
        let home = directories::BaseDirs::new()?;
        return Some(home.home_dir().join(rest));
    }
    Some(PathBuf::from(raw))
}

impl Config {
    /// First of `./nanodata.toml` and the per-user `config.toml` that
    /// exists, or the defaults when neither does.
    pub fn load() -> Result<Self> {
        let user = directories::ProjectDirs::from("", "", "nanodata")
            .map(|dirs| dirs.config_dir().join("config.toml"));
        let candidates = std::iter::once(PathBuf::from("nanodata.toml")).chain(user);

        for path in candidates {
            if path.is_file() {
                return Self::from_file(&path);
            }
        }
        log::debug!("no nanodata.toml found; using built-in defaults");
        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let config = toml::from_str::<Config>(&text)
            .with_context(|| format!("invalid config in {}", path.display()))?;
        log::debug!("config: {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let repo = &self.repository;
        ensure!(repo.shard_bytes > 0, "repository.shard_bytes must be positive");
        ensure!(
            (1..=22).contains(&repo.zstd_level),
            "repository.zstd_level must be in 1..=22, got {}",
            repo.zstd_level
        );
        ensure!(repo.batch_size > 0, "repository.batch_size must be positive");
        ensure!(self.http.read_timeout > 0, "http.read_timeout must be positive");
        Ok(())
    }
}
