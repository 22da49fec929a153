use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use nanodata_store::{split_files, ContentHash, Dataset, EntryManifest, Error, Result};
use serde::Serialize;

use super::DEFAULT_SPLIT;
use crate::repository::Repository;
use crate::source::DataSource;
use crate::transforms::with_mime_type;

/// Parquet files already on disk.
///
/// Either a directory laid out as `{split}/*.parquet` (with an optional
/// `aux/`), or a single `.parquet` file imported as split `train`.
#[derive(Debug, Clone)]
pub struct LocalSource {
    path: PathBuf,
    mime_type: Option<String>,
    hash: ContentHash,
}

#[derive(Serialize)]
struct LocalParams<'a> {
    path: String,
    mime_type: Option<&'a str>,
    content: String,
}

impl LocalSource {
    /// Resolve `path` and hash its current contents.
    pub fn new(path: impl AsRef<Path>, mime_type: Option<String>) -> Result<Self> {
        let path = path.as_ref();
        let path = fs::canonicalize(path).map_err(|e| Error::io(path, e))?;

        let content = if path.is_file() {
            ContentHash::of_file(&path).map_err(|e| Error::io(&path, e))?
        } else {
            if split_files(&path)?.is_empty() {
                return Err(Error::not_found("parquet split", path.display().to_string()));
            }
            EntryManifest::compute_file_hashes(&path)?.1
        };
        let hash = ContentHash::try_of_params(
            "local",
            &LocalParams {
                path: path.to_string_lossy().into_owned(),
                mime_type: mime_type.as_deref(),
                content: content.to_hex(),
            },
        )?;
        Ok(Self {
            path,
            mime_type,
            hash,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn view(&self) -> Result<Dataset> {
        if self.path.is_file() {
            let files = BTreeMap::from([(DEFAULT_SPLIT.to_string(), vec![self.path.clone()])]);
            Dataset::from_files(self.hash, &self.path, files)
        } else {
            Dataset::scan(self.hash, &self.path)
        }
    }
}

impl DataSource for LocalSource {
    fn content_hash(&self) -> ContentHash {
        self.hash
    }

    fn describe(&self) -> String {
        format!("local:{}", self.path.display())
    }

    /// Untagged data is returned as a view for the repository to copy;
    /// tagged data is written directly with the mime type applied.
    fn prepare(&self, repo: &Repository) -> Result<Dataset> {
        if let Some(cached) = repo.lookup(&self.hash)? {
            return Ok(cached);
        }
        let view = self.view()?;
        let Some(mime) = self.mime_type.as_deref() else {
            return Ok(view);
        };
        repo.materialize(&self.hash, |writer| {
            writer.write_mapped(&view, |batch| with_mime_type(batch, Some(mime)))
        })
    }
}
