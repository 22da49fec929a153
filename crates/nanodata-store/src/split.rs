//! Sharded Parquet writer for a single split

use std::fs::{self, File};
use std::path::PathBuf;

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;

use crate::error::{Error, Result};
use crate::manifest::SplitManifest;

/// Shard rotation threshold: 128 MiB of encoded Parquet per file.
pub const DEFAULT_SHARD_BYTES: u64 = 128 * 1024 * 1024;

/// Default zstd compression level for shards.
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

/// Rows per Parquet row group. Bounds writer memory independent of split size.
const ROW_GROUP_ROWS: usize = 128 * 1024;

/// Tunables for shard output.
#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    pub shard_bytes: u64,
    pub zstd_level: i32,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            shard_bytes: DEFAULT_SHARD_BYTES,
            zstd_level: DEFAULT_ZSTD_LEVEL,
        }
    }
}

/// Shard file name for a 1-based shard index.
pub fn shard_name(index: usize) -> String {
    format!("part-{index:05}.parquet")
}

/// Streams record batches of one split into `part-NNNNN.parquet` shards.
///
/// The first batch fixes the schema (fields and metadata). A later batch
/// with a different schema fails with [`Error::SchemaMismatch`], discards the
/// shards written so far and poisons the writer.
pub struct SplitWriter {
    name: String,
    dir: PathBuf,
    options: WriteOptions,
    schema: Option<SchemaRef>,
    current: Option<ArrowWriter<File>>,
    shards: Vec<String>,
    rows: u64,
    poisoned: Option<(String, String)>,
}

impl std::fmt::Debug for SplitWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SplitWriter")
            .field("name", &self.name)
            .field("shards", &self.shards.len())
            .field("rows", &self.rows)
            .finish_non_exhaustive()
    }
}

impl SplitWriter {
    /// Create the split directory; fails if the split was already opened.
    pub(crate) fn create(dir: PathBuf, name: &str, options: WriteOptions) -> Result<Self> {
        match fs::create_dir(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(Error::already_exists("split", name));
            }
            Err(e) => return Err(Error::io(&dir, e)),
        }
        Ok(Self {
            name: name.to_string(),
            dir,
            options,
            schema: None,
            current: None,
            shards: Vec::new(),
            rows: 0,
            poisoned: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schema fixed by the first batch, if any.
    pub fn schema(&self) -> Option<&SchemaRef> {
        self.schema.as_ref()
    }

    /// Rows written so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Write a record batch, rotating to a new shard past the size threshold.
    pub fn write_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        if let Some((expected, found)) = &self.poisoned {
            return Err(self.mismatch(expected.clone(), found.clone()));
        }
        match &self.schema {
            None => self.schema = Some(batch.schema()),
            Some(schema) if schema.as_ref() != batch.schema().as_ref() => {
                let expected = format!("{schema:?}");
                let found = format!("{:?}", batch.schema());
                self.poison(expected.clone(), found.clone());
                return Err(self.mismatch(expected, found));
            }
            Some(_) => {}
        }

        self.rotate_if_full()?;
        if self.current.is_none() {
            self.open_shard()?;
        }
        if let Some(writer) = self.current.as_mut() {
            writer.write(batch)?;
        }
        self.rows += batch.num_rows() as u64;
        Ok(())
    }

    /// Write every batch of an iterator.
    pub fn write_all<I>(&mut self, batches: I) -> Result<()>
    where
        I: IntoIterator<Item = Result<RecordBatch>>,
    {
        for batch in batches {
            self.write_batch(&batch?)?;
        }
        Ok(())
    }

    /// Flush the open shard and describe what was written.
    pub(crate) fn finish(mut self) -> Result<SplitManifest> {
        if let Some((expected, found)) = self.poisoned.take() {
            return Err(self.mismatch(expected, found));
        }
        self.close_shard()?;

        let mut bytes = 0;
        for shard in &self.shards {
            let path = self.dir.join(shard);
            bytes += fs::metadata(&path).map_err(|e| Error::io(&path, e))?.len();
        }

        let metadata = self
            .schema
            .as_ref()
            .map(|s| s.metadata().clone().into_iter().collect())
            .unwrap_or_default();

        Ok(SplitManifest {
            shards: std::mem::take(&mut self.shards),
            rows: self.rows,
            bytes,
            metadata,
        })
    }

    fn mismatch(&self, expected: String, found: String) -> Error {
        Error::SchemaMismatch {
            split: self.name.clone(),
            expected,
            found,
        }
    }

    /// Drop partial output so the split can never be mistaken for complete.
    fn poison(&mut self, expected: String, found: String) {
        log::warn!("split '{}': schema mismatch, discarding shards", self.name);
        self.current = None;
        for shard in self.shards.drain(..) {
            let _ = fs::remove_file(self.dir.join(shard));
        }
        self.rows = 0;
        self.poisoned = Some((expected, found));
    }

    fn rotate_if_full(&mut self) -> Result<()> {
        let full = self.current.as_ref().is_some_and(|w| {
            (w.bytes_written() + w.in_progress_size()) as u64 >= self.options.shard_bytes
        });
        if full {
            log::debug!(
                "split '{}': shard {} reached threshold, rotating",
                self.name,
                self.shards.len()
            );
            self.close_shard()?;
        }
        Ok(())
    }

    fn open_shard(&mut self) -> Result<()> {
        let Some(schema) = self.schema.clone() else {
            return Ok(());
        };
        let filename = shard_name(self.shards.len() + 1);
        let path = self.dir.join(&filename);
        let file = File::create(&path).map_err(|e| Error::io(&path, e))?;

        let level = ZstdLevel::try_new(self.options.zstd_level)?;
        let props = WriterProperties::builder()
            .set_compression(Compression::ZSTD(level))
            .set_max_row_group_size(ROW_GROUP_ROWS)
            .build();

        self.current = Some(ArrowWriter::try_new(file, schema, Some(props))?);
        self.shards.push(filename);
        Ok(())
    }

    fn close_shard(&mut self) -> Result<()> {
        if let Some(writer) = self.current.take() {
            writer.close()?;
        }
        Ok(())
    }
}
