//! Dataset-to-dataset transformations

use arrow::array::RecordBatch;
use nanodata_store::{ContentHash, Dataset, Result};

use crate::repository::Repository;

/// Pure dataset-to-dataset operation identified by its parameters.
pub trait DataTransform: Send + Sync {
    /// Pure, parameter-derived hash.
    fn content_hash(&self) -> ContentHash;

    fn describe(&self) -> String;

    /// Map one record batch. Called once per batch of every split.
    fn map_batch(&self, batch: RecordBatch) -> Result<RecordBatch>;

    /// Materialize `input` transformed, keyed by `chain(input, self)`.
    ///
    /// Returns the cached entry without calling `map_batch` when present.
    fn transform(&self, input: &Dataset, repo: &Repository) -> Result<Dataset> {
        apply_batchwise(self, input, repo)
    }
}

/// Stream every split of `input` through `map_batch` into a new entry.
/// Aux files are copied unchanged.
pub fn apply_batchwise<T>(transform: &T, input: &Dataset, repo: &Repository) -> Result<Dataset>
where
    T: DataTransform + ?Sized,
{
    let hash = input.hash().chain(&transform.content_hash());
    repo.materialize(&hash, |writer| {
        log::info!(
            "transform {}: {} -> {}",
            transform.describe(),
            input.hash().short(),
            hash.short()
        );
        writer.write_mapped(input, |batch| transform.map_batch(batch))
    })
}
