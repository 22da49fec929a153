//! Read-only dataset handles over a directory of split shards

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::datatypes::{Schema, SchemaRef};
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use parquet::file::reader::{FileReader, SerializedFileReader};

use crate::error::{Error, Result};
use crate::hash::ContentHash;
use crate::manifest::EntryManifest;

/// Schema metadata key classifying a split's row shape.
pub const MIME_TYPE_KEY: &str = "mime_type";

/// Name of the auxiliary (non-tabular) file area inside a dataset.
pub const AUX_DIR: &str = "aux";

/// Default rows per batch when streaming a split.
pub const DEFAULT_BATCH_SIZE: usize = 8192;

/// Summary of one split.
#[derive(Debug, Clone)]
pub struct SplitInfo {
    pub name: String,
    /// Row count.
    pub size: u64,
    /// Encoded bytes across shards.
    pub content_size: u64,
    pub schema: SchemaRef,
}

impl SplitInfo {
    pub fn mime_type(&self) -> Option<&str> {
        self.schema.metadata().get(MIME_TYPE_KEY).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
struct SplitLayout {
    shards: Vec<PathBuf>,
    rows: u64,
    bytes: u64,
    /// Schema metadata recorded at write time; scanned splits have none.
    metadata: HashMap<String, String>,
}

/// Immutable bundle of named splits plus an auxiliary file area.
///
/// Either backed by a complete store entry (see [`crate::ContentStore::lookup`])
/// or by a scanned directory of `{split}/*.parquet` files.
#[derive(Debug, Clone)]
pub struct Dataset {
    hash: ContentHash,
    root: PathBuf,
    splits: BTreeMap<String, SplitLayout>,
    batch_size: usize,
}

impl Dataset {
    /// Build a handle from a store entry's manifest.
    pub(crate) fn from_manifest(root: &Path, manifest: &EntryManifest) -> Self {
        let splits = manifest
            .splits
            .iter()
            .map(|(name, split)| {
                let dir = root.join(name);
                let layout = SplitLayout {
                    shards: split.shards.iter().map(|s| dir.join(s)).collect(),
                    rows: split.rows,
                    bytes: split.bytes,
                    metadata: split.metadata.clone().into_iter().collect(),
                };
                (name.clone(), layout)
            })
            .collect();
        Self {
            hash: manifest.hash,
            root: root.to_path_buf(),
            splits,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Scan a directory laid out as `{split}/**/*.parquet` (+ optional `aux/`).
    ///
    /// The caller vouches for `hash`; nothing here derives it from content.
    pub fn scan(hash: ContentHash, root: &Path) -> Result<Self> {
        Self::from_files(hash, root, split_files(root)?)
    }

    /// Build a handle from explicit split → shard file lists.
    pub fn from_files(
        hash: ContentHash,
        root: &Path,
        files: BTreeMap<String, Vec<PathBuf>>,
    ) -> Result<Self> {
        let mut splits = BTreeMap::new();
        for (name, shards) in files {
            let mut rows = 0u64;
            let mut bytes = 0u64;
            for shard in &shards {
                let file = File::open(shard).map_err(|e| Error::io(shard, e))?;
                bytes += file.metadata().map_err(|e| Error::io(shard, e))?.len();
                let reader = SerializedFileReader::new(file)?;
                rows += reader.metadata().file_metadata().num_rows() as u64;
            }
            splits.insert(
                name,
                SplitLayout {
                    shards,
                    rows,
                    bytes,
                    metadata: HashMap::new(),
                },
            );
        }
        Ok(Self {
            hash,
            root: root.to_path_buf(),
            splits,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    /// Rows per batch yielded by [`Split::batches`].
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn hash(&self) -> ContentHash {
        self.hash
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn split_names(&self) -> impl Iterator<Item = &str> {
        self.splits.keys().map(String::as_str)
    }

    pub fn has_split(&self, name: &str) -> bool {
        self.splits.contains_key(name)
    }

    pub fn split_info(&self, name: &str) -> Result<SplitInfo> {
        let layout = self.layout(name)?;
        let schema = match layout.shards.first() {
            Some(shard) => read_schema(shard)?,
            None => Arc::new(Schema::empty().with_metadata(layout.metadata.clone())),
        };
        Ok(SplitInfo {
            name: name.to_string(),
            size: layout.rows,
            content_size: layout.bytes,
            schema,
        })
    }

    pub fn split_infos(&self) -> Result<Vec<SplitInfo>> {
        self.splits.keys().map(|name| self.split_info(name)).collect()
    }

    /// Open a split for streaming.
    pub fn split(&self, name: &str) -> Result<Split> {
        let layout = self.layout(name)?;
        Ok(Split {
            name: name.to_string(),
            shards: layout.shards.clone(),
            rows: layout.rows,
            batch_size: self.batch_size,
        })
    }

    /// Directory holding auxiliary files, if the dataset has any.
    pub fn aux_dir(&self) -> Option<PathBuf> {
        let dir = self.root.join(AUX_DIR);
        dir.is_dir().then_some(dir)
    }

    /// Auxiliary files as paths relative to the aux directory.
    pub fn aux_files(&self) -> Result<Vec<PathBuf>> {
        let Some(dir) = self.aux_dir() else {
            return Ok(Vec::new());
        };
        let mut files = Vec::new();
        collect_files(&dir, &dir, &mut files)?;
        files.sort();
        Ok(files)
    }

    fn layout(&self, name: &str) -> Result<&SplitLayout> {
        self.splits
            .get(name)
            .ok_or_else(|| Error::not_found("split", name))
    }
}

/// Parquet files under `root` grouped by top-level directory (the split),
/// sorted by path. `aux/` is skipped.
pub fn split_files(root: &Path) -> Result<BTreeMap<String, Vec<PathBuf>>> {
    let files = glob_files(root, "*/**/*.parquet")?;

    let mut grouped: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for file in files {
        let Ok(rel) = file.strip_prefix(root) else {
            continue;
        };
        let Some(split) = rel.components().next() else {
            continue;
        };
        let split = split.as_os_str().to_string_lossy().into_owned();
        if split == AUX_DIR {
            continue;
        }
        grouped.entry(split).or_default().push(file);
    }
    Ok(grouped)
}

/// Regular files under `root` matching `suffix`, sorted. `root` is taken
/// literally, so brackets or `*` in a directory name are not pattern syntax.
pub(crate) fn glob_files(root: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    let base = glob::Pattern::escape(&root.to_string_lossy());
    let pattern = format!("{}/{suffix}", base.trim_end_matches('/'));
    let mut files: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| Error::Config(format!("invalid glob pattern: {e}")))?
        .filter_map(|e| e.ok())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    Ok(files)
}

fn collect_files(base: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(base, &path, out)?;
        } else if let Ok(rel) = path.strip_prefix(base) {
            out.push(rel.to_path_buf());
        }
    }
    Ok(())
}

/// Read the Arrow schema (with metadata) stored in a Parquet file.
pub fn read_schema(path: &Path) -> Result<SchemaRef> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    Ok(builder.schema().clone())
}

/// Open one Parquet file as a record batch reader.
pub fn open_parquet(path: &Path, batch_size: usize) -> Result<ParquetRecordBatchReader> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    Ok(ParquetRecordBatchReaderBuilder::try_new(file)?
        .with_batch_size(batch_size)
        .build()?)
}

/// A split opened for reading.
#[derive(Debug, Clone)]
pub struct Split {
    name: String,
    shards: Vec<PathBuf>,
    rows: u64,
    batch_size: usize,
}

impl Split {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_rows(&self) -> u64 {
        self.rows
    }

    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    /// Stream all batches, shard after shard. Single pass.
    pub fn batches(self) -> SplitBatches {
        SplitBatches {
            shards: self.shards.into_iter(),
            current: None,
            batch_size: self.batch_size,
        }
    }
}

/// Iterator over a split's record batches across all shards.
pub struct SplitBatches {
    shards: std::vec::IntoIter<PathBuf>,
    current: Option<ParquetRecordBatchReader>,
    batch_size: usize,
}

impl Iterator for SplitBatches {
    type Item = Result<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(reader) = self.current.as_mut() {
                match reader.next() {
                    Some(batch) => return Some(batch.map_err(Error::from)),
                    None => self.current = None,
                }
            }
            let shard = self.shards.next()?;
            match open_parquet(&shard, self.batch_size) {
                Ok(reader) => self.current = Some(reader),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field};
    use parquet::arrow::ArrowWriter;

    use super::*;

    fn write_parquet(path: &Path, values: Vec<i64>) {
        let schema = Arc::new(Schema::new(vec![Field::new("a", DataType::Int64, false)]));
        let batch =
            RecordBatch::try_new(schema.clone(), vec![Arc::new(Int64Array::from(values))])
                .unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut writer = ArrowWriter::try_new(File::create(path).unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn scan_groups_by_split_and_skips_aux() {
        let dir = tempfile::tempdir().unwrap();
        write_parquet(&dir.path().join("train/part-00001.parquet"), vec![1, 2, 3]);
        write_parquet(&dir.path().join("train/part-00002.parquet"), vec![4]);
        write_parquet(&dir.path().join("test/part-00001.parquet"), vec![5, 6]);
        write_parquet(&dir.path().join("aux/extra.parquet"), vec![7]);

        let ds = Dataset::scan(ContentHash::of_str("d"), dir.path()).unwrap();
        assert_eq!(ds.split_names().collect::<Vec<_>>(), vec!["test", "train"]);
        assert_eq!(ds.split_info("train").unwrap().size, 4);
        assert_eq!(ds.split_info("test").unwrap().size, 2);
        assert!(!ds.has_split("aux"));
    }

    #[test]
    fn batches_span_shards_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write_parquet(&dir.path().join("train/part-00001.parquet"), vec![1, 2]);
        write_parquet(&dir.path().join("train/part-00002.parquet"), vec![3]);

        let ds = Dataset::scan(ContentHash::of_str("d"), dir.path()).unwrap();
        let split = ds.split("train").unwrap();
        assert_eq!(split.num_shards(), 2);
        let values: Vec<i64> = split
            .batches()
            .map(|b| b.unwrap())
            .flat_map(|b| {
                b.column(0)
                    .as_any()
                    .downcast_ref::<Int64Array>()
                    .unwrap()
                    .values()
                    .to_vec()
            })
            .collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn missing_split_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let ds = Dataset::scan(ContentHash::of_str("d"), dir.path()).unwrap();
        assert!(ds.split("train").unwrap_err().is_not_found());
        assert!(ds.split_info("train").unwrap_err().is_not_found());
    }

    #[test]
    fn scan_root_with_glob_characters() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("data[v2]*?");
        write_parquet(&root.join("train/a.parquet"), vec![1, 2]);

        let ds = Dataset::scan(ContentHash::of_str("d"), &root).unwrap();
        assert_eq!(ds.split_names().collect::<Vec<_>>(), vec!["train"]);
        assert_eq!(ds.split_info("train").unwrap().size, 2);
    }

    #[test]
    fn shardless_split_keeps_recorded_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = EntryManifest {
            format_version: crate::manifest::CURRENT_FORMAT_VERSION,
            hash: ContentHash::of_str("d"),
            splits: BTreeMap::from([(
                "train".to_string(),
                crate::manifest::SplitManifest {
                    shards: Vec::new(),
                    rows: 0,
                    bytes: 0,
                    metadata: BTreeMap::from([(MIME_TYPE_KEY.into(), "data/text".into())]),
                },
            )]),
            file_hashes: BTreeMap::new(),
            content_hash: String::new(),
            created_at: chrono::Utc::now(),
        };

        let ds = Dataset::from_manifest(dir.path(), &manifest);
        let info = ds.split_info("train").unwrap();
        assert_eq!(info.size, 0);
        assert!(info.schema.fields().is_empty());
        assert_eq!(info.mime_type(), Some("data/text"));
    }

    #[test]
    fn aux_files_are_relative() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("aux/nested")).unwrap();
        fs::write(dir.path().join("aux/classes.json"), b"[]").unwrap();
        fs::write(dir.path().join("aux/nested/readme.txt"), b"hi").unwrap();

        let ds = Dataset::scan(ContentHash::of_str("d"), dir.path()).unwrap();
        assert_eq!(
            ds.aux_files().unwrap(),
            vec![PathBuf::from("classes.json"), PathBuf::from("nested/readme.txt")]
        );
    }
}
