//! Blake3 content hashes for datasets, sources and transforms

use std::fmt;
use std::io;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Length of a hex-encoded [`ContentHash`].
pub const HEX_LEN: usize = 64;

/// 256-bit content-addressing key.
///
/// Displayed and persisted as 64 lowercase hex characters; the same string
/// names the entry's directory in the store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; 32]);

/// Error returned when parsing a malformed hex hash.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid content hash '{0}'")]
pub struct ParseHashError(pub String);

impl ContentHash {
    /// Hash raw bytes.
    pub fn of_bytes(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Hash a UTF-8 string.
    pub fn of_str(s: &str) -> Self {
        Self::of_bytes(s.as_bytes())
    }

    /// Hash a file's contents (memory-mapped).
    pub fn of_file(path: &Path) -> io::Result<Self> {
        let mut hasher = blake3::Hasher::new();
        hasher.update_mmap(path)?;
        Ok(Self(*hasher.finalize().as_bytes()))
    }

    /// Hash a tag plus the canonical JSON of content-affecting parameters.
    ///
    /// Field order follows struct declaration order; callers sort collection
    /// fields before hashing when order carries no meaning. The JSON is
    /// streamed into the hasher, never buffered.
    pub fn try_of_params<T: Serialize + ?Sized>(tag: &str, params: &T) -> crate::Result<Self> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(tag.as_bytes());
        hasher.update(b":");
        serde_json::to_writer(&mut hasher, params)?;
        Ok(Self(*hasher.finalize().as_bytes()))
    }

    /// [`try_of_params`](Self::try_of_params) for parameter structs made of
    /// strings, numbers and string-keyed collections.
    ///
    /// # Panics
    ///
    /// If `params` cannot be expressed as JSON (a map with non-string keys,
    /// or a failing custom `Serialize`).
    pub fn of_params<T: Serialize + ?Sized>(tag: &str, params: &T) -> Self {
        Self::try_of_params(tag, params).expect("parameter structs serialize to JSON")
    }

    /// One step of the pipeline hash chain: `hash(hex(self) + "-" + hex(next))`.
    pub fn chain(&self, next: &ContentHash) -> Self {
        Self::of_str(&format!("{self}-{next}"))
    }

    /// Combine multiple hashes into one by hashing their concatenated bytes.
    pub fn combine(hashes: &[ContentHash]) -> Self {
        let mut hasher = blake3::Hasher::new();
        for h in hashes {
            hasher.update(&h.0);
        }
        Self(*hasher.finalize().as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.to_string()
    }

    /// First 8 hex characters, for display.
    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }

    /// Whether `s` has the shape of a hex-encoded hash.
    pub fn looks_like_hash(s: &str) -> bool {
        s.len() == HEX_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(blake3::Hash::from(self.0).to_hex().as_str())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short())
    }
}

impl FromStr for ContentHash {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        blake3::Hash::from_hex(s.to_ascii_lowercase())
            .map(|h| Self(*h.as_bytes()))
            .map_err(|_| ParseHashError(s.to_string()))
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
