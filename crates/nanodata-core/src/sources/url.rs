use nanodata_store::{ContentHash, Dataset, Result};
use serde::{Deserialize, Serialize};

use super::{copy_parquet, default_split};
use crate::http::download_to_file;
use crate::repository::Repository;
use crate::source::DataSource;
use crate::transforms::with_mime_type;

/// A single parquet file fetched over HTTP into one split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlSource {
    pub url: String,
    #[serde(default = "default_split")]
    pub split: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

impl UrlSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            split: default_split(),
            mime_type: None,
        }
    }

    pub fn with_split(mut self, split: impl Into<String>) -> Self {
        self.split = split.into();
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

impl DataSource for UrlSource {
    fn content_hash(&self) -> ContentHash {
        ContentHash::of_params("url", self)
    }

    fn describe(&self) -> String {
        format!("url:{}", self.url)
    }

    fn prepare(&self, repo: &Repository) -> Result<Dataset> {
        let batch_size = repo.store().options().batch_size;
        repo.materialize(&self.content_hash(), |writer| {
            let file = writer.scratch("download")?.join("data.parquet");
            let pb = repo.progress().download_bar(&self.split);
            pb.set_message(self.url.clone());
            download_to_file(&self.url, &file, &pb)?;
            pb.finish_and_clear();

            let split = writer.split(&self.split)?;
            copy_parquet(split, &file, batch_size, |batch| match &self.mime_type {
                Some(mime) => with_mime_type(batch, Some(mime)),
                None => Ok(batch),
            })
        })
    }
}
