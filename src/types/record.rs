use serde::{Deserialize, Serialize};
use std::fmt;

use super::language::LanguageTag;

/// Monotonic counter tagging one indexing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanGeneration(pub u64);

impl ScanGeneration {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Number of generations elapsed since `earlier`, saturating at zero.
    pub fn since(self, earlier: ScanGeneration) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for ScanGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen#{}", self.0)
    }
}

/// Stable content hash (blake3, hex encoded).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    pub fn of(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One indexed file, keyed by its root-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub size: u64,
    pub digest: Digest,
    pub language: LanguageTag,
    pub generation: ScanGeneration,
}

impl FileRecord {
    pub fn new(path: impl Into<String>, size: u64, digest: Digest, language: LanguageTag, generation: ScanGeneration) -> Self {
        Self {
            path: path.into(),
            size,
            digest,
            language,
            generation,
        }
    }

    /// Build a record straight from file bytes.
    pub fn from_bytes(path: impl Into<String>, bytes: &[u8], language: LanguageTag, generation: ScanGeneration) -> Self {
        Self::new(path, bytes.len() as u64, Digest::of(bytes), language, generation)
    }

    /// Parent directory key in the adjacency index; the root is the empty string.
    pub fn parent_dir(&self) -> &str {
        parent_of(&self.path)
    }

    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        name.rfind('.').filter(|&i| i > 0).map(|i| &name[i + 1..])
    }
}

/// Record of a file that disappeared from a full walk and waits out its grace period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone {
    pub path: String,
    pub digest: Digest,
    pub removed_at: ScanGeneration,
}

pub(crate) fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// True when `path` is `dir` or lies below it. Both are root-relative; `""` is the root.
pub fn is_within(path: &str, dir: &str) -> bool {
    dir.is_empty() || path == dir || path.strip_prefix(dir).is_some_and(|rest| rest.starts_with('/'))
}
