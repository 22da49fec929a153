use std::io::Cursor;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, BinaryArray, RecordBatch, StructArray};
use arrow::datatypes::DataType;
use image::imageops::FilterType;
use image::ImageOutputFormat;
use nanodata_store::{ContentHash, Error, Result};
use serde::{Deserialize, Serialize};

use crate::transform::DataTransform;

fn default_column() -> String {
    "image".to_string()
}

/// Resize every image of an encoded-image column to `width` x `height`.
///
/// The column must be a `{bytes: binary, path: utf8}` struct; images are
/// decoded, resized exactly with Lanczos3 and re-encoded as PNG.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeImages {
    #[serde(default = "default_column")]
    pub column: String,
    pub width: u32,
    pub height: u32,
}

impl ResizeImages {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Self::for_column("image", width, height)
    }

    pub fn for_column(column: impl Into<String>, width: u32, height: u32) -> Result<Self> {
        let resize = Self {
            column: column.into(),
            width,
            height,
        };
        resize.validate()?;
        Ok(resize)
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::Config(format!(
                "resize target must be non-empty, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }

    fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        let img = image::load_from_memory(data).map_err(|e| self.error(e))?;
        let resized = img.resize_exact(self.width, self.height, FilterType::Lanczos3);
        let mut out = Cursor::new(Vec::new());
        resized
            .write_to(&mut out, ImageOutputFormat::Png)
            .map_err(|e| self.error(e))?;
        Ok(out.into_inner())
    }

    fn error(&self, e: image::ImageError) -> Error {
        Error::Transform {
            transform: self.describe(),
            message: e.to_string(),
        }
    }
}

impl DataTransform for ResizeImages {
    fn content_hash(&self) -> ContentHash {
        ContentHash::of_params("resize_images", self)
    }

    fn describe(&self) -> String {
        format!("resize_images({}, {}x{})", self.column, self.width, self.height)
    }

    fn map_batch(&self, batch: RecordBatch) -> Result<RecordBatch> {
        let schema = batch.schema();
        let index = schema
            .index_of(&self.column)
            .map_err(|_| Error::not_found("column", self.column.as_str()))?;

        let column = batch.column(index);
        let unsupported = || {
            Error::UnsupportedShape(format!(
                "column '{}' is {}, expected struct<bytes: binary, path: utf8>",
                self.column,
                column.data_type()
            ))
        };
        let images = column.as_struct_opt().ok_or_else(unsupported)?;
        let (fields, children, nulls) = images.clone().into_parts();
        let Some(bytes_index) = fields.iter().position(|f| f.name() == "bytes") else {
            return Err(unsupported());
        };
        if fields[bytes_index].data_type() != &DataType::Binary {
            return Err(unsupported());
        }

        let bytes = children[bytes_index].as_binary::<i32>();
        let resized = (0..bytes.len())
            .map(|i| {
                if bytes.is_null(i) {
                    Ok(None)
                } else {
                    self.encode(bytes.value(i)).map(Some)
                }
            })
            .collect::<Result<Vec<Option<Vec<u8>>>>>()?;

        let mut children = children;
        children[bytes_index] = Arc::new(BinaryArray::from_iter(resized)) as ArrayRef;
        let images = StructArray::try_new(fields, children, nulls)?;

        let mut columns = batch.columns().to_vec();
        columns[index] = Arc::new(images);
        Ok(RecordBatch::try_new(schema, columns)?)
    }
}
