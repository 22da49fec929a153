//! Content-addressable store for materialized datasets
//!
//! Directory layout:
//! ```text
//! {base}/
//! ├── registry.json            # alias → hash (see registry.rs)
//! └── store/
//!     └── {hash}/              # reserved atomically by initialize
//!         ├── manifest.json    # completion marker, written last
//!         ├── {split}/part-00001.parquet
//!         └── aux/
//! ```
//!
//! A directory without a manifest is *pending*: either a writer is still
//! running or one crashed. Pending entries are never served by `lookup`.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

use arrow::array::RecordBatch;
use serde::Serialize;

use crate::dataset::{Dataset, AUX_DIR, DEFAULT_BATCH_SIZE};
use crate::error::{Error, Result};
use crate::hash::ContentHash;
use crate::manifest::{EntryManifest, CURRENT_FORMAT_VERSION, MANIFEST_FILE};
use crate::split::{SplitWriter, WriteOptions};

/// Scratch area inside a reserved entry, removed before the manifest is written.
const SCRATCH_DIR: &str = ".scratch";

/// Default bound on waiting for another writer to complete an entry.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

const POLL_INITIAL: Duration = Duration::from_millis(50);
const POLL_MAX: Duration = Duration::from_secs(2);

/// Store tunables.
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    pub write: WriteOptions,
    /// Rows per batch when reading splits.
    pub batch_size: usize,
    /// Bound on [`ContentStore::wait_for`] when losing an initialize race.
    pub wait_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            write: WriteOptions::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}

/// State of a store entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    Complete,
    Pending,
}

/// Summary of a store entry for listing.
#[derive(Debug, Serialize)]
pub struct StoreEntry {
    pub hash: ContentHash,
    pub state: EntryState,
    pub splits: usize,
    pub rows: u64,
    pub bytes: u64,
    pub created_at: String,
    pub referenced: bool,
}

/// Verification result for a single file.
#[derive(Debug)]
pub struct VerifyResult {
    pub path: String,
    pub expected: String,
    pub actual: String,
    pub ok: bool,
}

/// Content-addressable dataset store.
#[derive(Debug)]
pub struct ContentStore {
    dir: PathBuf,
    options: StoreOptions,
    initialized: AtomicU64,
}

impl ContentStore {
    /// Open (creating if needed) the store under `base/store`.
    pub fn open(base: &Path, options: StoreOptions) -> Result<Self> {
        let dir = base.join("store");
        fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        Ok(Self {
            dir,
            options,
            initialized: AtomicU64::new(0),
        })
    }

    pub fn store_dir(&self) -> &Path {
        &self.dir
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub fn entry_dir(&self, hash: &ContentHash) -> PathBuf {
        self.dir.join(hash.to_hex())
    }

    /// Whether the hash's namespace is reserved (complete or pending).
    pub fn exists(&self, hash: &ContentHash) -> bool {
        self.entry_dir(hash).is_dir()
    }

    /// Whether the entry finished writing.
    pub fn is_complete(&self, hash: &ContentHash) -> bool {
        self.entry_dir(hash).join(MANIFEST_FILE).is_file()
    }

    /// Number of successful `initialize` calls on this handle.
    pub fn initialize_count(&self) -> u64 {
        self.initialized.load(Ordering::Relaxed)
    }

    /// Reserve `hash` and return a writer for its content.
    ///
    /// Exactly one caller wins per hash, across threads and processes; every
    /// other caller gets [`Error::AlreadyExists`].
    pub fn initialize(&self, hash: &ContentHash) -> Result<EntryWriter<'_>> {
        let dir = self.entry_dir(hash);
        match fs::create_dir(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(Error::already_exists("dataset", hash.to_hex()));
            }
            Err(e) => return Err(Error::io(&dir, e)),
        }
        self.initialized.fetch_add(1, Ordering::Relaxed);
        log::debug!("store: reserved {}", hash.short());
        Ok(EntryWriter {
            store: self,
            hash: *hash,
            dir,
            splits: BTreeMap::new(),
            finished: false,
        })
    }

    /// Read handle over a complete entry; `None` if absent or still pending.
    pub fn lookup(&self, hash: &ContentHash) -> Result<Option<Dataset>> {
        let dir = self.entry_dir(hash);
        if !dir.join(MANIFEST_FILE).is_file() {
            return Ok(None);
        }
        match EntryManifest::read_from(&dir) {
            Ok(manifest) if manifest.format_version != CURRENT_FORMAT_VERSION => {
                log::warn!(
                    "store {}: format_version {} != current {}, ignoring",
                    hash.short(),
                    manifest.format_version,
                    CURRENT_FORMAT_VERSION,
                );
                Ok(None)
            }
            Ok(manifest) => Ok(Some(
                Dataset::from_manifest(&dir, &manifest).with_batch_size(self.options.batch_size),
            )),
            Err(e) => {
                log::warn!("corrupt store entry {}: {e}", hash.short());
                Ok(None)
            }
        }
    }

    /// Wait for another writer to complete `hash`.
    ///
    /// Polls with exponential backoff. Fails with `NotFound` if the entry
    /// disappears (writer rolled back) and `Incomplete` past `timeout`.
    pub fn wait_for(&self, hash: &ContentHash, timeout: Duration) -> Result<Dataset> {
        let start = Instant::now();
        let mut delay = POLL_INITIAL;
        loop {
            if let Some(data) = self.lookup(hash)? {
                return Ok(data);
            }
            if !self.exists(hash) {
                return Err(Error::not_found("dataset", hash.to_hex()));
            }
            let waited = start.elapsed();
            if waited >= timeout {
                return Err(Error::Incomplete {
                    hash: hash.to_hex(),
                    waited,
                });
            }
            log::debug!("store: waiting on {} ({waited:?})", hash.short());
            std::thread::sleep(delay.min(timeout - waited));
            delay = (delay * 2).min(POLL_MAX);
        }
    }

    /// All entry hashes present in the store, complete or pending.
    pub fn hashes(&self) -> Result<Vec<ContentHash>> {
        let mut hashes = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(|e| Error::io(&self.dir, e))? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Ok(hash) = entry.file_name().to_string_lossy().parse::<ContentHash>() {
                hashes.push(hash);
            }
        }
        hashes.sort();
        Ok(hashes)
    }

    /// List all entries, flagging those in `referenced`.
    pub fn list(&self, referenced: &HashSet<ContentHash>) -> Result<Vec<StoreEntry>> {
        let mut entries = Vec::new();
        for hash in self.hashes()? {
            let dir = self.entry_dir(&hash);
            let entry = match EntryManifest::read_from(&dir) {
                Ok(manifest) => StoreEntry {
                    hash,
                    state: EntryState::Complete,
                    splits: manifest.splits.len(),
                    rows: manifest.total_rows(),
                    bytes: manifest.total_bytes(),
                    created_at: manifest.created_at.format("%Y-%m-%d %H:%M").to_string(),
                    referenced: referenced.contains(&hash),
                },
                Err(_) => StoreEntry {
                    hash,
                    state: EntryState::Pending,
                    splits: 0,
                    rows: 0,
                    bytes: 0,
                    created_at: String::new(),
                    referenced: referenced.contains(&hash),
                },
            };
            entries.push(entry);
        }
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(entries)
    }

    /// Remove an entry that no alias in `referenced` points at. Returns
    /// whether anything was deleted; an aliased entry fails with `InUse`.
    pub fn remove(&self, hash: &ContentHash, referenced: &HashSet<ContentHash>) -> Result<bool> {
        if referenced.contains(hash) {
            return Err(Error::InUse {
                hash: hash.to_hex(),
            });
        }
        self.remove_entry(hash)
    }

    fn remove_entry(&self, hash: &ContentHash) -> Result<bool> {
        let dir = self.entry_dir(hash);
        if !dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        Ok(true)
    }

    /// Remove complete entries not in `referenced`. Pending entries are left
    /// alone since a writer may still own them.
    pub fn gc(&self, referenced: &HashSet<ContentHash>) -> Result<Vec<ContentHash>> {
        let mut removed = Vec::new();
        for hash in self.hashes()? {
            if referenced.contains(&hash) || !self.is_complete(&hash) {
                continue;
            }
            log::info!("gc: removing unreferenced {}", hash.short());
            self.remove_entry(&hash)?;
            removed.push(hash);
        }
        Ok(removed)
    }

    /// Remove pending entries whose directory is older than `min_age`
    /// (left behind by crashed writers).
    pub fn cleanup_incomplete(&self, min_age: Duration) -> Result<usize> {
        let now = SystemTime::now();
        let mut count = 0;
        for hash in self.hashes()? {
            if self.is_complete(&hash) {
                continue;
            }
            let dir = self.entry_dir(&hash);
            let modified = fs::metadata(&dir)
                .and_then(|m| m.modified())
                .map_err(|e| Error::io(&dir, e))?;
            let age = now.duration_since(modified).unwrap_or_default();
            if age >= min_age {
                log::info!("cleaning incomplete entry {}", hash.short());
                fs::remove_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
                count += 1;
            }
        }
        Ok(count)
    }

    /// Re-hash an entry's files against its manifest.
    pub fn verify(&self, hash: &ContentHash) -> Result<Vec<VerifyResult>> {
        let dir = self.entry_dir(hash);
        if !self.is_complete(hash) {
            return Err(Error::not_found("dataset", hash.to_hex()));
        }
        let manifest = EntryManifest::read_from(&dir)?;

        let mut results = Vec::new();
        for (filename, expected) in &manifest.file_hashes {
            let path = dir.join(filename);
            let (actual, ok) = if path.exists() {
                match ContentHash::of_file(&path) {
                    Ok(h) => {
                        let hex = h.to_hex();
                        let ok = hex == *expected;
                        (hex, ok)
                    }
                    Err(e) => (format!("error: {e}"), false),
                }
            } else {
                ("MISSING".to_string(), false)
            };
            results.push(VerifyResult {
                path: filename.clone(),
                expected: expected.clone(),
                actual,
                ok,
            });
        }
        Ok(results)
    }

    /// Verify all complete entries.
    pub fn verify_all(&self) -> Result<BTreeMap<ContentHash, Vec<VerifyResult>>> {
        let mut all = BTreeMap::new();
        for hash in self.hashes()? {
            if !self.is_complete(&hash) {
                continue;
            }
            match self.verify(&hash) {
                Ok(results) => {
                    all.insert(hash, results);
                }
                Err(e) => log::warn!("verify {}: {e}", hash.short()),
            }
        }
        Ok(all)
    }
}

/// Scoped writer for one reserved entry.
///
/// Call [`EntryWriter::finish`] to mark the entry complete. Dropping the
/// writer without finishing removes the reserved directory.
pub struct EntryWriter<'a> {
    store: &'a ContentStore,
    hash: ContentHash,
    dir: PathBuf,
    splits: BTreeMap<String, SplitWriter>,
    finished: bool,
}

impl std::fmt::Debug for EntryWriter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryWriter")
            .field("hash", &self.hash)
            .field("splits", &self.splits.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl EntryWriter<'_> {
    pub fn hash(&self) -> ContentHash {
        self.hash
    }

    /// Open a split for writing; fails if this writer already opened it.
    pub fn split(&mut self, name: &str) -> Result<&mut SplitWriter> {
        validate_split_name(name)?;
        if self.splits.contains_key(name) {
            return Err(Error::already_exists("split", name));
        }
        let writer = SplitWriter::create(self.dir.join(name), name, self.store.options.write)?;
        Ok(self.splits.entry(name.to_string()).or_insert(writer))
    }

    /// Auxiliary file area, created on first use.
    pub fn aux(&self) -> Result<PathBuf> {
        let dir = self.dir.join(AUX_DIR);
        fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        Ok(dir)
    }

    /// Private scratch directory, discarded before the entry completes.
    pub fn scratch(&self, name: &str) -> Result<PathBuf> {
        let dir = self.dir.join(SCRATCH_DIR).join(name);
        fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        Ok(dir)
    }

    /// Copy every split and aux file of `data` into this entry.
    pub fn write(&mut self, data: &Dataset) -> Result<()> {
        self.write_mapped(data, |batch| Ok(batch))
    }

    /// Copy `data`, passing every batch through `map`.
    pub fn write_mapped(
        &mut self,
        data: &Dataset,
        mut map: impl FnMut(RecordBatch) -> Result<RecordBatch>,
    ) -> Result<()> {
        let names: Vec<String> = data.split_names().map(str::to_string).collect();
        for name in names {
            let split = data.split(&name)?;
            let writer = self.split(&name)?;
            for batch in split.batches() {
                writer.write_batch(&map(batch?)?)?;
            }
        }
        self.copy_aux(data)
    }

    /// Copy aux files of `data` into this entry.
    pub fn copy_aux(&self, data: &Dataset) -> Result<()> {
        let Some(src) = data.aux_dir() else {
            return Ok(());
        };
        let dst = self.aux()?;
        for rel in data.aux_files()? {
            let to = dst.join(&rel);
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
            }
            let from = src.join(&rel);
            fs::copy(&from, &to).map_err(|e| Error::io(&from, e))?;
        }
        Ok(())
    }

    /// Close all splits, hash files and write the manifest.
    pub fn finish(mut self) -> Result<Dataset> {
        let mut splits = BTreeMap::new();
        for (name, writer) in std::mem::take(&mut self.splits) {
            splits.insert(name, writer.finish()?);
        }

        let scratch = self.dir.join(SCRATCH_DIR);
        if scratch.exists() {
            fs::remove_dir_all(&scratch).map_err(|e| Error::io(&scratch, e))?;
        }

        let (file_hashes, content_hash) = EntryManifest::compute_file_hashes(&self.dir)?;
        let manifest = EntryManifest {
            format_version: CURRENT_FORMAT_VERSION,
            hash: self.hash,
            splits,
            file_hashes,
            content_hash: content_hash.to_hex(),
            created_at: chrono::Utc::now(),
        };
        manifest.write_to(&self.dir)?;
        self.finished = true;

        log::info!(
            "store: completed {} ({} splits, {} rows)",
            self.hash.short(),
            manifest.splits.len(),
            manifest.total_rows()
        );
        Ok(Dataset::from_manifest(&self.dir, &manifest)
            .with_batch_size(self.store.options.batch_size))
    }
}

impl Drop for EntryWriter<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        log::warn!("store: rolling back unfinished entry {}", self.hash.short());
        self.splits.clear();
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            log::warn!("store: rollback of {} failed: {e}", self.dir.display());
        }
    }
}

fn validate_split_name(name: &str) -> Result<()> {
    let reserved = name == AUX_DIR || name == SCRATCH_DIR || name == MANIFEST_FILE;
    if name.is_empty() || reserved || name.starts_with('.') || name.contains(['/', '\\']) {
        return Err(Error::Config(format!("invalid split name '{name}'")));
    }
    Ok(())
}
