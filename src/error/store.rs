use std::path::PathBuf;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum StoreError {
    /// The file exists but cannot be parsed or fails validation. Never auto-recovered.
    #[error("registry document {} is corrupt: {reason}", path.display())]
    Corruption { path: PathBuf, reason: String },

    #[error("registry file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("registry IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("refusing to save invalid registry document: {reason}")]
    InvalidDocument { reason: String },

    #[error("registry serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("registry lock poisoned for {}", path.display())]
    LockPoisoned { path: PathBuf },
}

impl StoreError {
    /// IO failure on a write path; a vanished file here is still an IO error.
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    /// IO failure while reading a document; a missing file is `NotFound`.
    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound { path }
        } else {
            StoreError::Io { path, source }
        }
    }

    pub fn is_corruption(&self) -> bool {
        matches!(self, StoreError::Corruption { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}
