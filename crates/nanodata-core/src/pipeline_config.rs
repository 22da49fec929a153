//! Pipeline files: a TOML description of a source and its transforms
//!
//! ```toml
//! alias = "mnist-small"
//!
//! [source]
//! type = "hub"
//! repo = "ylecun/mnist"
//! revision = "refs/convert/parquet"
//! content_sha = "77f3279092a1c1579b2250db8eafed0ad422088c"
//! files = { train = ["mnist/train/0000.parquet"] }
//!
//! [[transforms]]
//! type = "resize_images"
//! width = 16
//! height = 16
//! ```

use std::fs;
use std::path::Path;

use nanodata_store::{Error, Result};
use serde::Deserialize;

use crate::pipeline::Pipeline;
use crate::source::DataSource;
use crate::transform::DataTransform;
use crate::variant::VariantRegistry;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineFile {
    /// Alias to register the result under.
    #[serde(default)]
    pub alias: Option<String>,
    pub source: serde_json::Value,
    #[serde(default)]
    pub transforms: Vec<serde_json::Value>,
}

impl PipelineFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::parse(&content).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Instantiate the pipeline through the given registries.
    pub fn build(
        &self,
        sources: &VariantRegistry<Box<dyn DataSource>>,
        transforms: &VariantRegistry<Box<dyn DataTransform>>,
    ) -> Result<Pipeline> {
        let source = sources.build(self.source.clone())?;
        let transforms = self
            .transforms
            .iter()
            .map(|t| transforms.build(t.clone()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Pipeline::from_boxed(source, transforms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::UrlSource;
    use crate::transforms::DropColumns;
    use crate::variant::{builtin_sources, builtin_transforms};

    const EXAMPLE: &str = r#"
alias = "small"

[source]
type = "url"
url = "https://example.com/train.parquet"
mime_type = "data/text"

[[transforms]]
type = "drop_columns"
columns = ["id"]

[[transforms]]
type = "set_mime_type"
mime_type = "data/text"
"#;

    #[test]
    fn parse_and_build() {
        let file = PipelineFile::parse(EXAMPLE).unwrap();
        assert_eq!(file.alias.as_deref(), Some("small"));
        assert_eq!(file.transforms.len(), 2);

        let pipeline = file
            .build(&builtin_sources(), &builtin_transforms())
            .unwrap();
        assert_eq!(pipeline.transforms().len(), 2);

        let source = UrlSource::new("https://example.com/train.parquet").with_mime_type("data/text");
        assert_eq!(pipeline.stage_hashes()[0], source.content_hash());
        assert_eq!(
            pipeline.stage_hashes()[1],
            source
                .content_hash()
                .chain(&DropColumns::new(["id"]).content_hash())
        );
    }

    #[test]
    fn source_only() {
        let file = PipelineFile::parse(
            r#"
[source]
type = "generator"
command = "make-data"
args = ["--rows", "10"]
"#,
        )
        .unwrap();
        assert!(file.alias.is_none());
        let pipeline = file
            .build(&builtin_sources(), &builtin_transforms())
            .unwrap();
        assert_eq!(pipeline.content_hash(), pipeline.source().content_hash());
    }

    #[test]
    fn invalid_toml_is_config_error() {
        assert!(matches!(
            PipelineFile::parse("[source"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            PipelineFile::parse("alias = \"x\""),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn load_prefixes_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "nonsense = 1").unwrap();
        let err = PipelineFile::load(&path).unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }
}
