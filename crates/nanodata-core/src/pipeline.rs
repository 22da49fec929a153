//! Source + transform chains with hash-chained identity

use nanodata_store::{ContentHash, Dataset, Result};

use crate::repository::Repository;
use crate::source::DataSource;
use crate::transform::DataTransform;

/// A source followed by an ordered list of transforms.
///
/// Identity is the hash chain `h0 = source`, `hi = chain(h(i-1), ti)`, so a
/// pipeline used as the source of another hashes exactly like the flattened
/// pipeline, and every prefix is cached under its own stage hash.
pub struct Pipeline {
    source: Box<dyn DataSource>,
    transforms: Vec<Box<dyn DataTransform>>,
}

impl Pipeline {
    pub fn new(source: impl DataSource + 'static) -> Self {
        Self::from_boxed(Box::new(source), Vec::new())
    }

    pub fn from_boxed(source: Box<dyn DataSource>, transforms: Vec<Box<dyn DataTransform>>) -> Self {
        Self { source, transforms }
    }

    /// `Pipeline(source, t1, t2, ...)`.
    pub fn compose<I>(source: impl DataSource + 'static, transforms: I) -> Self
    where
        I: IntoIterator<Item = Box<dyn DataTransform>>,
    {
        Self::from_boxed(Box::new(source), transforms.into_iter().collect())
    }

    /// Append a transform.
    pub fn then(mut self, transform: impl DataTransform + 'static) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }

    pub fn source(&self) -> &dyn DataSource {
        self.source.as_ref()
    }

    pub fn transforms(&self) -> &[Box<dyn DataTransform>] {
        &self.transforms
    }

    /// Fold transform hashes onto `base`.
    pub fn chain_hash(base: ContentHash, transforms: &[Box<dyn DataTransform>]) -> ContentHash {
        transforms
            .iter()
            .fold(base, |acc, t| acc.chain(&t.content_hash()))
    }

    /// Hash after each stage, source first.
    pub fn stage_hashes(&self) -> Vec<ContentHash> {
        let mut hashes = Vec::with_capacity(self.transforms.len() + 1);
        let mut acc = self.source.content_hash();
        hashes.push(acc);
        for t in &self.transforms {
            acc = acc.chain(&t.content_hash());
            hashes.push(acc);
        }
        hashes
    }
}

impl DataSource for Pipeline {
    fn content_hash(&self) -> ContentHash {
        Self::chain_hash(self.source.content_hash(), &self.transforms)
    }

    fn describe(&self) -> String {
        std::iter::once(self.source.describe())
            .chain(self.transforms.iter().map(|t| t.describe()))
            .collect::<Vec<_>>()
            .join(" | ")
    }

    fn prepare(&self, repo: &Repository) -> Result<Dataset> {
        let mut data = repo.fetch_source(self.source.as_ref())?;
        for t in &self.transforms {
            data = t.transform(&data, repo)?;
        }
        Ok(data)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("describe", &self.describe())
            .field("hash", &self.content_hash())
            .finish()
    }
}
