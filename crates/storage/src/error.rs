//! Error types for storage operations.

use rusty_assets_common::PathError;
use rusty_assets_filesystem::FileSystemError;
use thiserror::Error;

/// Errors that can occur during remote store operations.
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// Document or asset not found in the remote store.
    #[error("Not found: {key}")]
    NotFound { key: String },

    /// The store already holds an asset with this content.
    ///
    /// Raised on upload when another client created the asset after this
    /// run's existence check.
    #[error("Conflict for {key}: {message}")]
    Conflict { key: String, message: String },

    /// Access denied.
    #[error("Access denied to {key}: {message}")]
    AccessDenied { key: String, message: String },

    /// Network error.
    #[error("Network error: {message}")]
    NetworkError { message: String, retryable: bool },

    /// Local I/O error.
    #[error("I/O error for {path}: {message}")]
    IoError { path: String, message: String },

    /// Local or remote data could not be interpreted.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Other error.
    #[error("{message}")]
    Other { message: String },
}

impl StorageError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::NetworkError { retryable, .. } => *retryable,
            StorageError::NotFound { .. } => false,
            StorageError::Conflict { .. } => false,
            StorageError::AccessDenied { .. } => false,
            StorageError::IoError { .. } => false,
            StorageError::InvalidData { .. } => false,
            StorageError::Other { .. } => false,
        }
    }

    /// Check if this error reports an already existing asset.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict { .. })
    }

    /// Create an IoError from std::io::Error.
    ///
    /// # Arguments
    /// * `path` - Path where the error occurred
    /// * `err` - The underlying IO error
    pub fn from_io(path: impl Into<String>, err: std::io::Error) -> Self {
        StorageError::IoError {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError {
            path: String::new(),
            message: err.to_string(),
        }
    }
}

impl From<PathError> for StorageError {
    fn from(err: PathError) -> Self {
        match err {
            PathError::IoError { path, message } => StorageError::IoError { path, message },
            other => StorageError::InvalidData {
                message: other.to_string(),
            },
        }
    }
}

impl From<FileSystemError> for StorageError {
    fn from(err: FileSystemError) -> Self {
        match err {
            FileSystemError::IoError { path, message } => StorageError::IoError { path, message },
            other => StorageError::InvalidData {
                message: other.to_string(),
            },
        }
    }
}

/// Non-fatal error recorded against a single asset.
#[derive(Debug, Clone)]
pub struct TransferError {
    /// The asset path or document ID that failed.
    pub key: String,
    /// The error that occurred.
    pub error: StorageError,
}

impl TransferError {
    /// Create a new transfer error.
    pub fn new(key: impl Into<String>, error: StorageError) -> Self {
        Self {
            key: key.into(),
            error,
        }
    }
}

/// Errors that abort an import before or outside per-asset work.
#[derive(Error, Debug)]
pub enum ImportError {
    /// The source has no `data.ndjson` sidecar.
    #[error("No data.ndjson file found in import source {path}")]
    MissingSidecar { path: String },

    /// The source has no files or images.
    #[error("No assets to import in {path}")]
    NoAssets { path: String },

    /// The source could not be read or extracted.
    #[error("Failed to read import source: {0}")]
    Source(#[source] FileSystemError),

    /// The sidecar could not be opened for loading into memory.
    #[error("Failed to read metadata sidecar: {0}")]
    Metadata(#[source] FileSystemError),

    /// A blocking task panicked or was cancelled.
    #[error("Background task failed: {message}")]
    TaskFailed { message: String },
}

/// Errors that abort an export.
#[derive(Error, Debug)]
pub enum ExportError {
    /// The destination directory already has content.
    #[error("Export destination is not empty: {path}")]
    DestinationNotEmpty { path: String },

    /// Listing remote assets failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Writing the export tree or archive failed.
    #[error(transparent)]
    FileSystem(#[from] FileSystemError),

    /// A blocking task panicked or was cancelled.
    #[error("Background task failed: {message}")]
    TaskFailed { message: String },
}
