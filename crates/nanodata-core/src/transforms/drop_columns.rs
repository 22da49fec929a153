use arrow::array::RecordBatch;
use nanodata_store::{ContentHash, Error, Result};
use serde::{Deserialize, Serialize};

use super::with_mime_type;
use crate::transform::DataTransform;

/// Remove columns from every split.
///
/// The split's shape changes, so its `mime_type` is cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropColumns {
    pub columns: Vec<String>,
}

impl DropColumns {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

impl DataTransform for DropColumns {
    fn content_hash(&self) -> ContentHash {
        let mut columns = self.columns.clone();
        columns.sort();
        columns.dedup();
        ContentHash::of_params("drop_columns", &columns)
    }

    fn describe(&self) -> String {
        format!("drop_columns({})", self.columns.join(", "))
    }

    fn map_batch(&self, batch: RecordBatch) -> Result<RecordBatch> {
        let schema = batch.schema();
        for column in &self.columns {
            if schema.index_of(column).is_err() {
                return Err(Error::not_found("column", column.as_str()));
            }
        }
        let keep: Vec<usize> = schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, f)| !self.columns.contains(f.name()))
            .map(|(i, _)| i)
            .collect();
        with_mime_type(batch.project(&keep)?, None)
    }
}
