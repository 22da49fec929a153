//! Entry manifest: the completion marker of a store entry
//!
//! Written last, via tmp + rename, once every split and aux file is on disk.
//! A store directory without a readable manifest is never served.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::dataset::glob_files;
use crate::error::{Error, Result};
use crate::hash::ContentHash;

/// Bump when the on-disk layout changes; older entries are treated as absent.
pub const CURRENT_FORMAT_VERSION: u32 = 1;

pub const MANIFEST_FILE: &str = "manifest.json";

/// Per-split record: shards in read order plus cached split info.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitManifest {
    /// Shard file names relative to the split directory.
    pub shards: Vec<String>,
    pub rows: u64,
    /// Total encoded bytes across shards.
    pub bytes: u64,
    /// Schema-level metadata (e.g. `mime_type`).
    pub metadata: BTreeMap<String, String>,
}

/// Manifest stored at `{entry}/manifest.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryManifest {
    pub format_version: u32,
    /// Content hash this entry is stored under.
    pub hash: ContentHash,
    pub splits: BTreeMap<String, SplitManifest>,
    /// Per-file blake3 hashes (relative path → hex), data and aux alike.
    pub file_hashes: BTreeMap<String, String>,
    /// Combined hash over all files, for integrity checks.
    pub content_hash: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl EntryManifest {
    /// Hash every file under `dir` (recursively), skipping the top-level manifest.
    /// Paths come back sorted, so the combined hash is deterministic.
    ///
    /// Returns (file_hashes, combined_content_hash).
    pub fn compute_file_hashes(dir: &Path) -> Result<(BTreeMap<String, String>, ContentHash)> {
        let mut entries = glob_files(dir, "**/*")?;
        entries.retain(|p| p.strip_prefix(dir).is_ok_and(|rel| rel != Path::new(MANIFEST_FILE)));

        let hashed: Vec<(String, ContentHash)> = entries
            .par_iter()
            .map(|path| {
                let h = ContentHash::of_file(path).map_err(|e| Error::io(path, e))?;
                let rel = path
                    .strip_prefix(dir)
                    .unwrap_or(path)
                    .to_string_lossy()
                    .into_owned();
                Ok((rel, h))
            })
            .collect::<Result<_>>()?;

        let content_hash = if hashed.is_empty() {
            ContentHash::of_bytes(b"empty")
        } else {
            ContentHash::combine(&hashed.iter().map(|(_, h)| *h).collect::<Vec<_>>())
        };
        let file_hashes = hashed
            .into_iter()
            .map(|(rel, h)| (rel, h.to_hex()))
            .collect();

        Ok((file_hashes, content_hash))
    }

    /// Atomically write `dir/manifest.json` (tmp + rename).
    pub fn write_to(&self, dir: &Path) -> Result<()> {
        let path = dir.join(MANIFEST_FILE);
        let tmp = dir.join(format!("{MANIFEST_FILE}.tmp"));
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&tmp, json).map_err(|e| Error::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| Error::io(&path, e))?;
        Ok(())
    }

    /// Read `dir/manifest.json`.
    pub fn read_from(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let json = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Total rows across splits.
    pub fn total_rows(&self) -> u64 {
        self.splits.values().map(|s| s.rows).sum()
    }

    /// Total shard bytes across splits.
    pub fn total_bytes(&self) -> u64 {
        self.splits.values().map(|s| s.bytes).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(hash: ContentHash) -> EntryManifest {
        EntryManifest {
            format_version: CURRENT_FORMAT_VERSION,
            hash,
            splits: BTreeMap::from([(
                "train".to_string(),
                SplitManifest {
                    shards: vec!["part-00001.parquet".into()],
                    rows: 10,
                    bytes: 100,
                    metadata: BTreeMap::from([("mime_type".into(), "data/text".into())]),
                },
            )]),
            file_hashes: BTreeMap::new(),
            content_hash: "deadbeef".into(),
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn file_hashes_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let (hashes, combined) = EntryManifest::compute_file_hashes(dir.path()).unwrap();
        assert!(hashes.is_empty());
        assert_eq!(combined, ContentHash::of_bytes(b"empty"));
    }

    #[test]
    fn file_hashes_recursive_relative_keys() {
        let dir = tempfile::tempdir().unwrap();
        let train = dir.path().join("train");
        let aux = dir.path().join("aux");
        fs::create_dir_all(&train).unwrap();
        fs::create_dir_all(&aux).unwrap();
        fs::write(train.join("part-00001.parquet"), b"rows").unwrap();
        fs::write(aux.join("labels.txt"), b"cat\ndog").unwrap();

        let (hashes, _) = EntryManifest::compute_file_hashes(dir.path()).unwrap();
        assert_eq!(hashes.len(), 2);
        assert!(hashes.contains_key("train/part-00001.parquet"));
        assert!(hashes.contains_key("aux/labels.txt"));
    }

    #[test]
    fn file_hashes_exclude_manifest() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("data.parquet"), b"data").unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), b"{}").unwrap();

        let (hashes, _) = EntryManifest::compute_file_hashes(dir.path()).unwrap();
        assert_eq!(hashes.len(), 1);
        assert!(!hashes.contains_key(MANIFEST_FILE));
    }

    #[test]
    fn nested_manifest_named_files_are_hashed() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("aux")).unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), b"{}").unwrap();
        fs::write(dir.path().join("aux").join(MANIFEST_FILE), b"{\"labels\": []}").unwrap();

        let (hashes, _) = EntryManifest::compute_file_hashes(dir.path()).unwrap();
        assert_eq!(hashes.keys().collect::<Vec<_>>(), vec!["aux/manifest.json"]);
    }

    #[test]
    fn file_hashes_under_bracketed_dir() {
        let dir = tempfile::tempdir().unwrap();
        let entry = dir.path().join("repo[1]").join("entry");
        fs::create_dir_all(entry.join("train")).unwrap();
        fs::write(entry.join("train/part-00001.parquet"), b"rows").unwrap();

        let (hashes, combined) = EntryManifest::compute_file_hashes(&entry).unwrap();
        assert!(hashes.contains_key("train/part-00001.parquet"));
        assert_ne!(combined, ContentHash::of_bytes(b"empty"));
    }

    #[test]
    fn file_hashes_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.parquet"), b"b").unwrap();
        fs::write(dir.path().join("a.parquet"), b"a").unwrap();

        let (_, h1) = EntryManifest::compute_file_hashes(dir.path()).unwrap();
        let (_, h2) = EntryManifest::compute_file_hashes(dir.path()).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn roundtrip_leaves_no_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = sample(ContentHash::of_str("x"));
        manifest.write_to(dir.path()).unwrap();

        assert!(!dir.path().join("manifest.json.tmp").exists());
        let loaded = EntryManifest::read_from(dir.path()).unwrap();
        assert_eq!(loaded.hash, manifest.hash);
        assert_eq!(loaded.splits, manifest.splits);
        assert_eq!(loaded.total_rows(), 10);
        assert_eq!(loaded.total_bytes(), 100);
    }

    #[test]
    fn read_from_missing_or_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        assert!(EntryManifest::read_from(dir.path()).is_err());
        fs::write(dir.path().join(MANIFEST_FILE), b"not valid json").unwrap();
        assert!(EntryManifest::read_from(dir.path()).is_err());
    }
}
