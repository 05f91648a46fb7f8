//! Unified error handling for document fingerprinting.

use std::path::PathBuf;

/// Fatal errors raised while fingerprinting a results document.
///
/// Locations that cannot be fingerprinted are not errors; they are skipped
/// and logged by the driver.
#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    #[error("Invalid results document: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("Failed to serialize results document: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Hashing task failed: {0}")]
    Task(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FingerprintError {
    /// Wrap an I/O error with the path of the file being read.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Check if this error came from reading a source file.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}
