//! Error type for store, registry and pipeline operations

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Failure surfaced by any nanodata operation.
///
/// Callers branch on the variant: `AlreadyExists` is recoverable by falling
/// back to a lookup, the rest are raised unchanged to the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// An entry is still bound to an alias and cannot be removed.
    #[error("entry {hash} is still aliased; deregister it first")]
    InUse { hash: String },

    /// A hash, split or alias was (re-)initialized while already present.
    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: &'static str, name: String },

    /// An alias, hash, split or column is absent.
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    /// Batches within one split disagree on schema.
    #[error("schema mismatch in split '{split}': expected {expected}, got {found}")]
    SchemaMismatch {
        split: String,
        expected: String,
        found: String,
    },

    /// A source or transform produced content under the wrong hash.
    #[error("hash mismatch: declared {declared}, produced {produced}")]
    HashMismatch { declared: String, produced: String },

    /// No handler for the schema a source or transform encountered.
    #[error("unsupported shape: {0}")]
    UnsupportedShape(String),

    /// Another writer holds the entry and did not finish in time.
    #[error("entry {hash} still incomplete after {waited:?}")]
    Incomplete { hash: String, waited: Duration },

    /// A generator command failed.
    #[error("generator '{command}' failed: {message}")]
    Generator { command: String, message: String },

    /// A transform failed on row data (decode/encode errors).
    #[error("transform '{transform}' failed: {message}")]
    Transform { transform: String, message: String },

    /// Network failure while fetching a source.
    #[error("HTTP error for {url}: {message}")]
    Http {
        url: String,
        status: Option<u16>,
        message: String,
    },

    /// Invalid user-supplied configuration.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error for '{path}': {source}")]
    IoPath {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for nanodata operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn already_exists(kind: &'static str, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind,
            name: name.into(),
        }
    }

    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Attach a path to an I/O error.
    pub fn io(path: &Path, source: io::Error) -> Self {
        Self::IoPath {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
