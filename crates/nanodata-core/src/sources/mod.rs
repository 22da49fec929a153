//! Built-in data sources

mod generator;
mod hub;
mod local;
mod url;

use std::path::Path;

use arrow::array::RecordBatch;
use nanodata_store::{open_parquet, Result, SplitWriter};

pub use generator::GeneratorSource;
pub use hub::{HubSource, DEFAULT_HUB_ENDPOINT};
pub use local::LocalSource;
pub use url::UrlSource;

/// Default split for single-file sources.
pub const DEFAULT_SPLIT: &str = "train";

fn default_split() -> String {
    DEFAULT_SPLIT.to_string()
}

/// Stream one parquet file into `writer`, mapping every batch.
fn copy_parquet<F>(writer: &mut SplitWriter, path: &Path, batch_size: usize, map: F) -> Result<()>
where
    F: Fn(RecordBatch) -> Result<RecordBatch>,
{
    for batch in open_parquet(path, batch_size)? {
        writer.write_batch(&map(batch?)?)?;
    }
    Ok(())
}
