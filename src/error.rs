use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RepoLensError>;

#[derive(Error, Debug)]
pub enum RepoLensError {
    #[error("Repository root not found: {0}")]
    RootNotFound(PathBuf),

    #[error("Repository root is not a directory: {0}")]
    RootNotDirectory(PathBuf),

    #[error("Cannot access {path}: {reason}")]
    Access { path: String, reason: String },

    #[error("Extraction failed for {path}: {reason}")]
    Extraction { path: String, reason: String },

    #[error("Invalid query: {0}")]
    Query(String),

    #[error("Snapshot is corrupt: {0}")]
    SnapshotCorrupt(String),

    #[error("Index inconsistency: {0}")]
    Inconsistent(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Indexing was cancelled")]
    Cancelled,

    #[error("No repository has been scanned yet")]
    NotScanned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl RepoLensError {
    pub fn access(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::Access {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn extraction(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::Extraction {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Fatal errors abort a whole indexing operation; everything else is isolated per file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::RootNotFound(_) | Self::RootNotDirectory(_) | Self::SnapshotCorrupt(_) | Self::Inconsistent(_)
        )
    }
}

impl From<config::ConfigError> for RepoLensError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for RepoLensError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Config(err.to_string())
    }
}
