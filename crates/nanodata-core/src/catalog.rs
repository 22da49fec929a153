//! Schema catalog: maps raw source schemas to typed, mime-tagged shapes
//!
//! Matching is exact: same field names, in order, with the same types
//! (nullability and field metadata ignored). A split that already carries a
//! `mime_type` is passed through untouched.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::datatypes::{DataType, Field, Fields, Schema};
use nanodata_store::{Error, Result, MIME_TYPE_KEY};

pub const IMAGE_CLASS: &str = "data/image+class";
pub const TEXT: &str = "data/text";

/// Metadata key on the `class` field holding a JSON array of label names.
pub const CLASS_NAMES_KEY: &str = "class_names";

/// Schema metadata written by the dataset hub's parquet conversion.
const HUB_METADATA_KEY: &str = "huggingface";

/// Converts a batch of a matched raw schema into its target shape.
pub type ConvertFn = fn(RecordBatch) -> Result<RecordBatch>;

#[derive(Debug, Clone)]
pub struct CatalogEntry {
    mime_type: String,
    fields: Fields,
    convert: ConvertFn,
}

impl CatalogEntry {
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    fn matches(&self, fields: &Fields) -> bool {
        fields_match(&self.fields, fields)
    }
}

/// Registry of raw schema → converter entries.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    entries: Vec<CatalogEntry>,
}

impl SchemaCatalog {
    /// Empty catalog: only already-tagged splits pass.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the image classification and text shapes.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        for image_column in ["img", "image"] {
            catalog.entries.push(CatalogEntry {
                mime_type: IMAGE_CLASS.to_string(),
                fields: Fields::from(vec![
                    Field::new(image_column, image_struct_type(), true),
                    Field::new("label", DataType::Int64, true),
                ]),
                convert: convert_image_class,
            });
        }
        catalog.entries.push(CatalogEntry {
            mime_type: TEXT.to_string(),
            fields: Fields::from(vec![Field::new("text", DataType::Utf8, true)]),
            convert: convert_text,
        });
        catalog
    }

    /// Add an entry. Fails if an entry with the same field list exists.
    pub fn register(
        &mut self,
        mime_type: &str,
        fields: impl Into<Fields>,
        convert: ConvertFn,
    ) -> Result<()> {
        let fields = fields.into();
        if self.entries.iter().any(|e| e.matches(&fields)) {
            return Err(Error::already_exists("schema", describe_fields(&fields)));
        }
        self.entries.push(CatalogEntry {
            mime_type: mime_type.to_string(),
            fields,
            convert,
        });
        Ok(())
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Entry whose field list exactly matches `schema`.
    pub fn find(&self, schema: &Schema) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.matches(schema.fields()))
    }

    /// Tag `batch` with a mime type, converting it if needed.
    ///
    /// Fails with `UnsupportedShape` when the batch has no `mime_type` and
    /// no entry matches.
    pub fn normalize(&self, batch: RecordBatch) -> Result<RecordBatch> {
        let schema = batch.schema();
        if schema
            .metadata()
            .get(MIME_TYPE_KEY)
            .is_some_and(|m| !m.is_empty())
        {
            return Ok(batch);
        }
        let Some(entry) = self.find(&schema) else {
            return Err(Error::UnsupportedShape(format!(
                "no catalog entry for fields [{}]",
                describe_fields(schema.fields())
            )));
        };
        let converted = (entry.convert)(batch)?;
        crate::transforms::with_mime_type(converted, Some(&entry.mime_type))
    }
}

/// `{bytes: binary, path: utf8}`, the encoded-image column layout.
pub fn image_struct_type() -> DataType {
    DataType::Struct(Fields::from(vec![
        Field::new("bytes", DataType::Binary, true),
        Field::new("path", DataType::Utf8, true),
    ]))
}

fn fields_match(expected: &Fields, actual: &Fields) -> bool {
    expected.len() == actual.len()
        && expected
            .iter()
            .zip(actual.iter())
            .all(|(e, a)| e.name() == a.name() && types_match(e.data_type(), a.data_type()))
}

fn types_match(expected: &DataType, actual: &DataType) -> bool {
    match (expected, actual) {
        (DataType::Struct(e), DataType::Struct(a)) => fields_match(e, a),
        _ => expected == actual,
    }
}

fn describe_fields(fields: &Fields) -> String {
    fields
        .iter()
        .map(|f| format!("{}: {}", f.name(), f.data_type()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn field_mime(mime: &str) -> HashMap<String, String> {
    HashMap::from([(MIME_TYPE_KEY.to_string(), mime.to_string())])
}

/// Label names from the hub's `info.features.label.names` metadata.
fn hub_class_names(schema: &Schema) -> Option<String> {
    let raw = schema.metadata().get(HUB_METADATA_KEY)?;
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    let names = value.pointer("/info/features/label/names")?.as_array()?;
    Some(serde_json::Value::Array(names.clone()).to_string())
}

/// `(img|image, label)` → `(image, class)`, with label names when known.
fn convert_image_class(batch: RecordBatch) -> Result<RecordBatch> {
    let schema = batch.schema();
    let image = schema.field(0);
    let label = schema.field(1);

    let mut class_meta = field_mime("class/id");
    if let Some(names) = hub_class_names(&schema) {
        class_meta.insert(CLASS_NAMES_KEY.to_string(), names);
    }
    let fields = vec![
        Field::new("image", image.data_type().clone(), image.is_nullable())
            .with_metadata(field_mime("image/encoded")),
        Field::new("class", DataType::Int64, label.is_nullable()).with_metadata(class_meta),
    ];
    let target = Arc::new(Schema::new(fields));
    Ok(RecordBatch::try_new(target, batch.columns().to_vec())?)
}

fn convert_text(batch: RecordBatch) -> Result<RecordBatch> {
    let schema = batch.schema();
    let text = schema.field(0);
    let target = Arc::new(Schema::new(vec![Field::new(
        "text",
        DataType::Utf8,
        text.is_nullable(),
    )
    .with_metadata(field_mime("text/plain"))]));
    Ok(RecordBatch::try_new(target, batch.columns().to_vec())?)
}
