//! nanodata-store: content-addressable storage for tabular datasets
//!
//! Datasets are stored as sharded Parquet splits under the blake3 hash that
//! describes how they were produced. An alias registry gives hashes
//! human-readable names and roots garbage collection.

pub mod dataset;
pub mod error;
pub mod hash;
pub mod manifest;
pub mod registry;
pub mod split;
pub mod store;

pub use dataset::{
    open_parquet, read_schema, split_files, Dataset, Split, SplitInfo, AUX_DIR, DEFAULT_BATCH_SIZE,
    MIME_TYPE_KEY,
};
pub use error::{Error, Result};
pub use hash::ContentHash;
pub use manifest::EntryManifest;
pub use registry::AliasRegistry;
pub use split::{SplitWriter, WriteOptions, DEFAULT_SHARD_BYTES, DEFAULT_ZSTD_LEVEL};
pub use store::{
    ContentStore, EntryState, EntryWriter, StoreEntry, StoreOptions, VerifyResult,
    DEFAULT_WAIT_TIMEOUT,
};
