use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::datatypes::Schema;
use nanodata_store::{ContentHash, Result, MIME_TYPE_KEY};
use serde::{Deserialize, Serialize};

use crate::transform::DataTransform;

/// Replace (or with `None`, remove) the schema-level `mime_type` of a batch.
pub fn with_mime_type(batch: RecordBatch, mime_type: Option<&str>) -> Result<RecordBatch> {
    let schema = batch.schema();
    let mut metadata = schema.metadata().clone();
    match mime_type {
        Some(mime) => {
            metadata.insert(MIME_TYPE_KEY.to_string(), mime.to_string());
        }
        None => {
            metadata.remove(MIME_TYPE_KEY);
        }
    }
    if &metadata == schema.metadata() {
        return Ok(batch);
    }
    let schema = Arc::new(Schema::new_with_metadata(schema.fields().clone(), metadata));
    Ok(RecordBatch::try_new(schema, batch.columns().to_vec())?)
}

/// Tag every split with a mime type (or clear it). Row data is untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetMimeType {
    pub mime_type: Option<String>,
}

impl SetMimeType {
    pub fn new(mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: Some(mime_type.into()),
        }
    }

    pub fn clear() -> Self {
        Self { mime_type: None }
    }
}

impl DataTransform for SetMimeType {
    fn content_hash(&self) -> ContentHash {
        ContentHash::of_params("set_mime_type", self)
    }

    fn describe(&self) -> String {
        match &self.mime_type {
            Some(mime) => format!("set_mime_type({mime})"),
            None => "set_mime_type(none)".to_string(),
        }
    }

    fn map_batch(&self, batch: RecordBatch) -> Result<RecordBatch> {
        with_mime_type(batch, self.mime_type.as_deref())
    }
}
