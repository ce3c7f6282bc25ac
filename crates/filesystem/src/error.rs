//! Error types for file system operations.

use rusty_assets_common::PathError;
use thiserror::Error;

/// Errors that can occur while resolving sources or reading sidecars.
#[derive(Debug, Error, Clone)]
pub enum FileSystemError {
    /// Local I/O error.
    #[error("I/O error for {path}: {message}")]
    IoError { path: String, message: String },

    /// A sidecar line is not valid JSON, or not the expected shape.
    #[error("Parse error in {path} at line {line}: {message}")]
    ParseError {
        path: String,
        line: usize,
        message: String,
    },

    /// An archive could not be read or unpacked.
    #[error("Invalid archive {path}: {message}")]
    InvalidArchive { path: String, message: String },

    /// A path inside the source is invalid or escapes its root.
    #[error(transparent)]
    Path(#[from] PathError),
}

impl FileSystemError {
    /// Create an IoError from std::io::Error.
    ///
    /// # Arguments
    /// * `path` - Path where the error occurred
    /// * `err` - The underlying IO error
    pub fn from_io(path: impl Into<String>, err: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

impl From<walkdir::Error> for FileSystemError {
    fn from(err: walkdir::Error) -> Self {
        let path: String = err
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        FileSystemError::IoError {
            path,
            message: err.to_string(),
        }
    }
}
