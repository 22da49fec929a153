use std::collections::BTreeMap;

use arrow::array::RecordBatch;
use nanodata_store::{ContentHash, Dataset, Error, Result};
use serde::{Deserialize, Serialize};

use super::copy_parquet;
use crate::http::download_to_file;
use crate::repository::Repository;
use crate::source::DataSource;
use crate::transforms::with_mime_type;

pub const DEFAULT_HUB_ENDPOINT: &str = "https://huggingface.co";

/// Parquet files of one dataset hub revision.
///
/// Splits are listed explicitly as `split → [path]`. Without `mime_type`,
/// every batch is normalized through the repository's schema catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubSource {
    pub repo: String,
    pub revision: String,
    /// Hub-reported sha of the revision's content.
    pub content_sha: String,
    pub files: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Mirror base URL; not part of the identity.
    #[serde(default)]
    pub endpoint: Option<String>,
}

#[derive(Serialize)]
struct HubParams<'a> {
    repo: &'a str,
    revision: &'a str,
    content_sha: &'a str,
    files: &'a BTreeMap<String, Vec<String>>,
    mime_type: Option<&'a str>,
}

impl HubSource {
    pub fn new(
        repo: impl Into<String>,
        revision: impl Into<String>,
        content_sha: impl Into<String>,
        files: BTreeMap<String, Vec<String>>,
    ) -> Self {
        Self {
            repo: repo.into(),
            revision: revision.into(),
            content_sha: content_sha.into(),
            files,
            mime_type: None,
            endpoint: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Download URL of a file in this revision.
    pub fn file_url(&self, path: &str) -> String {
        let endpoint = self.endpoint.as_deref().unwrap_or(DEFAULT_HUB_ENDPOINT);
        format!(
            "{}/datasets/{}/resolve/{}/{}",
            endpoint.trim_end_matches('/'),
            self.repo,
            self.revision,
            path.trim_start_matches('/')
        )
    }
}

impl DataSource for HubSource {
    fn content_hash(&self) -> ContentHash {
        ContentHash::of_params(
            "hub",
            &HubParams {
                repo: &self.repo,
                revision: &self.revision,
                content_sha: &self.content_sha,
                files: &self.files,
                mime_type: self.mime_type.as_deref(),
            },
        )
    }

    fn describe(&self) -> String {
        let rev: String = self.revision.chars().take(8).collect();
        format!("hub:{}@{rev}", self.repo)
    }

    fn prepare(&self, repo: &Repository) -> Result<Dataset> {
        if self.files.values().all(Vec::is_empty) {
            return Err(Error::Config(format!("hub source {} lists no files", self.repo)));
        }
        let batch_size = repo.store().options().batch_size;
        let normalize = |batch: RecordBatch| match &self.mime_type {
            Some(mime) => with_mime_type(batch, Some(mime)),
            None => repo.catalog().normalize(batch),
        };

        repo.materialize(&self.content_hash(), |writer| {
            for (split, paths) in &self.files {
                let scratch = writer.scratch(split)?;
                let mut local = Vec::with_capacity(paths.len());
                for (i, path) in paths.iter().enumerate() {
                    let file = scratch.join(format!("{i:05}.parquet"));
                    let pb = repo.progress().download_bar(&format!("{split}/{i}"));
                    download_to_file(&self.file_url(path), &file, &pb)?;
                    pb.finish_and_clear();
                    local.push(file);
                }

                let split_writer = writer.split(split)?;
                for file in &local {
                    copy_parquet(split_writer, file, batch_size, normalize)?;
                }
                log::info!(
                    "{}: split {split} ({} rows)",
                    self.describe(),
                    split_writer.rows()
                );
            }
            Ok(())
        })
    }
}
