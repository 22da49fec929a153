//! Alias registry: human-readable names bound to content hashes
//!
//! Persisted as a JSON object at `{base}/registry.json`, rewritten
//! tmp + rename on every change.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::hash::ContentHash;
use crate::store::ContentStore;

pub const REGISTRY_FILE: &str = "registry.json";

/// Alias → hash mapping. Every alias points at a complete store entry.
#[derive(Debug)]
pub struct AliasRegistry {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AliasRegistry {
    pub fn open(base: &Path) -> Result<Self> {
        fs::create_dir_all(base).map_err(|e| Error::io(base, e))?;
        Ok(Self {
            path: base.join(REGISTRY_FILE),
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All registered aliases, sorted.
    pub fn keys(&self) -> Result<Vec<String>> {
        Ok(self.load()?.into_keys().collect())
    }

    /// Alias → hash pairs, sorted by alias.
    pub fn entries(&self) -> Result<BTreeMap<String, ContentHash>> {
        self.load()
    }

    /// Hash bound to `alias`, if any.
    pub fn get(&self, alias: &str) -> Result<Option<ContentHash>> {
        Ok(self.load()?.get(alias).copied())
    }

    /// Bind `alias` to a complete entry in `store`.
    ///
    /// Fails with `AlreadyExists` if the alias is taken (even by the same
    /// hash) and `NotFound` if the entry is absent or incomplete.
    pub fn register(&self, store: &ContentStore, alias: &str, hash: &ContentHash) -> Result<()> {
        validate_alias(alias)?;
        let _guard = self.guard();
        let mut map = self.load()?;
        if map.contains_key(alias) {
            return Err(Error::already_exists("alias", alias));
        }
        if !store.is_complete(hash) {
            return Err(Error::not_found("dataset", hash.to_hex()));
        }
        map.insert(alias.to_string(), *hash);
        self.save(&map)?;
        log::info!("registered {alias} -> {}", hash.short());
        Ok(())
    }

    /// Remove `alias`. Absent aliases are a no-op; returns the removed hash.
    pub fn deregister(&self, alias: &str) -> Result<Option<ContentHash>> {
        let _guard = self.guard();
        let mut map = self.load()?;
        let removed = map.remove(alias);
        if removed.is_some() {
            self.save(&map)?;
            log::info!("deregistered {alias}");
        }
        Ok(removed)
    }

    /// Hash named by an alias, or a literal hash of a complete entry.
    ///
    /// Aliases win over hex strings; hash-like aliases are never registered,
    /// so the two cannot collide.
    pub fn lookup(&self, store: &ContentStore, alias_or_hash: &str) -> Result<ContentHash> {
        if let Some(hash) = self.get(alias_or_hash)? {
            return Ok(hash);
        }
        let hash = alias_or_hash
            .parse::<ContentHash>()
            .map_err(|_| Error::not_found("alias", alias_or_hash))?;
        if !store.is_complete(&hash) {
            return Err(Error::not_found("dataset", hash.to_hex()));
        }
        Ok(hash)
    }

    /// [`lookup`](Self::lookup), then open the entry.
    pub fn resolve(&self, store: &ContentStore, alias_or_hash: &str) -> Result<Dataset> {
        let hash = self.lookup(store, alias_or_hash)?;
        store
            .lookup(&hash)?
            .ok_or_else(|| Error::not_found("dataset", hash.to_hex()))
    }

    /// Hashes reachable from any alias (the GC root set).
    pub fn referenced(&self) -> Result<HashSet<ContentHash>> {
        Ok(self.load()?.into_values().collect())
    }

    /// Aliases bound to `hash`.
    pub fn aliases_for(&self, hash: &ContentHash) -> Result<Vec<String>> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|(_, h)| h == hash)
            .map(|(alias, _)| alias)
            .collect())
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        // Poisoning ignored: writes are tmp + rename
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn load(&self) -> Result<BTreeMap<String, ContentHash>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let json = fs::read_to_string(&self.path).map_err(|e| Error::io(&self.path, e))?;
        if json.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&json)?)
    }

    fn save(&self, map: &BTreeMap<String, ContentHash>) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(map)?;
        fs::write(&tmp, json).map_err(|e| Error::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| Error::io(&self.path, e))?;
        Ok(())
    }
}

fn validate_alias(alias: &str) -> Result<()> {
    if alias.trim().is_empty() {
        return Err(Error::Config("alias must not be empty".into()));
    }
    if ContentHash::looks_like_hash(alias) {
        return Err(Error::Config(format!(
            "alias '{alias}' looks like a content hash"
        )));
    }
    Ok(())
}
