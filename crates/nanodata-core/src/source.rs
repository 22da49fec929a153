//! Declarative dataset sources

use nanodata_store::{ContentHash, Dataset, Result};

use crate::repository::Repository;

/// Description of how to obtain a dataset.
///
/// `content_hash` is a pure function of the declared parameters: no I/O,
/// stable across processes. `prepare` may hit the network or disk and must
/// yield a dataset whose hash equals `content_hash`.
pub trait DataSource: Send + Sync {
    fn content_hash(&self) -> ContentHash;

    /// One-line human description for logs and listings.
    fn describe(&self) -> String;

    /// Produce the dataset.
    ///
    /// Implementations either return a store-backed dataset (usually via
    /// [`Repository::materialize`], which short-circuits on a cache hit) or
    /// a transient view that [`Repository::fetch`] copies into the store.
    fn prepare(&self, repo: &Repository) -> Result<Dataset>;
}

/// What [`Repository::fetch`] should produce.
#[derive(Clone, Copy)]
pub enum FetchTarget<'a> {
    /// Resolve a registered alias (or literal hash); never materializes.
    Alias(&'a str),
    /// Materialize a source unless already cached.
    Source(&'a dyn DataSource),
}

impl<'a> From<&'a str> for FetchTarget<'a> {
    fn from(alias: &'a str) -> Self {
        Self::Alias(alias)
    }
}

impl<'a> From<&'a dyn DataSource> for FetchTarget<'a> {
    fn from(source: &'a dyn DataSource) -> Self {
        Self::Source(source)
    }
}

impl std::fmt::Debug for FetchTarget<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alias(alias) => f.debug_tuple("Alias").field(alias).finish(),
            Self::Source(source) => f.debug_tuple("Source").field(&source.describe()).finish(),
        }
    }
}
