//! Repository facade: store + aliases + fetch/materialize

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nanodata_store::{
    AliasRegistry, ContentHash, ContentStore, Dataset, EntryWriter, Error, Result, StoreOptions,
};

use crate::catalog::SchemaCatalog;
use crate::progress::{ProgressContext, SharedProgress};
use crate::source::{DataSource, FetchTarget};

/// Single entry point for materializing and resolving datasets.
pub struct Repository {
    root: PathBuf,
    store: ContentStore,
    registry: AliasRegistry,
    catalog: SchemaCatalog,
    progress: SharedProgress,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl Repository {
    /// Open (creating if needed) a repository rooted at `root`.
    pub fn open(root: &Path, options: StoreOptions) -> Result<Self> {
        let store = ContentStore::open(root, options)?;
        let registry = AliasRegistry::open(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            store,
            registry,
            catalog: SchemaCatalog::with_builtins(),
            progress: Arc::new(ProgressContext::hidden()),
        })
    }

    /// Per-user cache location (`~/.cache/nanodata` on Linux).
    pub fn default_root() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "nanodata").map(|d| d.cache_dir().to_path_buf())
    }

    pub fn with_catalog(mut self, catalog: SchemaCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_progress(mut self, progress: SharedProgress) -> Self {
        self.progress = progress;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn registry(&self) -> &AliasRegistry {
        &self.registry
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    pub fn progress(&self) -> &ProgressContext {
        &self.progress
    }

    /// Resolve an alias or materialize a source.
    pub fn fetch<'a>(&self, target: impl Into<FetchTarget<'a>>) -> Result<Dataset> {
        match target.into() {
            FetchTarget::Alias(alias) => self.registry.resolve(&self.store, alias),
            FetchTarget::Source(source) => self.fetch_source(source),
        }
    }

    /// Return the cached dataset for `source`, materializing it on a miss.
    ///
    /// The returned handle is always backed by the store.
    pub fn fetch_source(&self, source: &dyn DataSource) -> Result<Dataset> {
        let hash = source.content_hash();
        if let Some(data) = self.store.lookup(&hash)? {
            log::info!("cache hit: {} ({})", source.describe(), hash.short());
            return Ok(data);
        }

        log::info!("materializing {} ({})", source.describe(), hash.short());
        let data = source.prepare(self)?;
        if data.hash() != hash {
            return Err(Error::HashMismatch {
                declared: hash.to_hex(),
                produced: data.hash().to_hex(),
            });
        }
        // prepare may already have written the entry
        if let Some(stored) = self.store.lookup(&hash)? {
            return Ok(stored);
        }
        self.materialize(&hash, |writer| writer.write(&data))
    }

    /// Run `write` into a fresh entry for `hash` unless it is already cached.
    ///
    /// Losing the initialize race to another writer falls back to waiting
    /// for that writer (bounded by the store's wait timeout). If `write`
    /// fails, the reserved entry is rolled back.
    pub fn materialize<F>(&self, hash: &ContentHash, write: F) -> Result<Dataset>
    where
        F: FnOnce(&mut EntryWriter<'_>) -> Result<()>,
    {
        if let Some(data) = self.store.lookup(hash)? {
            return Ok(data);
        }
        let mut writer = match self.store.initialize(hash) {
            Ok(writer) => writer,
            Err(e) if e.is_already_exists() => {
                log::info!("{} is being written elsewhere, waiting", hash.short());
                return self
                    .store
                    .wait_for(hash, self.store.options().wait_timeout);
            }
            Err(e) => return Err(e),
        };
        write(&mut writer)?;
        writer.finish()
    }

    pub fn initialize(&self, hash: &ContentHash) -> Result<EntryWriter<'_>> {
        self.store.initialize(hash)
    }

    pub fn lookup(&self, hash: &ContentHash) -> Result<Option<Dataset>> {
        self.store.lookup(hash)
    }

    /// Alias or literal hash to the key of a complete entry, without opening it.
    pub fn resolve_hash(&self, alias_or_hash: &str) -> Result<ContentHash> {
        self.registry.lookup(&self.store, alias_or_hash)
    }

    /// Alias or literal hash to a complete dataset.
    pub fn resolve(&self, alias_or_hash: &str) -> Result<Dataset> {
        self.registry.resolve(&self.store, alias_or_hash)
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        self.registry.keys()
    }

    pub fn aliases(&self) -> Result<BTreeMap<String, ContentHash>> {
        self.registry.entries()
    }

    pub fn register(&self, alias: &str, hash: &ContentHash) -> Result<()> {
        self.registry.register(&self.store, alias, hash)
    }

    pub fn deregister(&self, alias: &str) -> Result<Option<ContentHash>> {
        self.registry.deregister(alias)
    }

    /// Delete complete entries no alias points at.
    pub fn gc(&self) -> Result<Vec<ContentHash>> {
        self.store.gc(&self.registry.referenced()?)
    }
}
