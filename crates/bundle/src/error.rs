//! Bundle error types

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Bundle-specific errors
#[derive(Debug, Error)]
pub enum BundleError {
    /// Artifact publish failed; nothing was written at `path`
    #[error("failed to write '{}': {message}", path.display())]
    Write { path: PathBuf, message: String },

    /// Bundle directory holds no regular files
    #[error("bundle directory '{}' is empty", dir.display())]
    EmptyBundle { dir: PathBuf },

    /// File resolves outside the bundle directory
    #[error("'{}' escapes the bundle directory", path.display())]
    PathEscape { path: PathBuf },

    /// ZIP32 size, offset or entry-count overflow
    #[error("zip32 limit exceeded: {message}")]
    ZipLimit { message: String },

    /// Required artifact missing when hashing the manifest
    #[error("required artifact '{path}' is missing")]
    MissingArtifact { path: String },

    /// JSON serialization error
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BundleError {
    pub fn write(path: &Path, message: impl Into<String>) -> Self {
        Self::Write {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    pub fn zip_limit(message: impl Into<String>) -> Self {
        Self::ZipLimit {
            message: message.into(),
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, BundleError>;
