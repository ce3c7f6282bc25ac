//! Asset kinds and local asset references.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{FILES_DIR, IMAGES_DIR};
use crate::error::PathError;
use crate::path_utils::resolve_relative_path;

/// Declared kind of an asset.
///
/// Digests are not namespaced across kinds at the remote store, so every
/// existence lookup is scoped by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    File,
}

impl AssetKind {
    /// All kinds, in the order the pipelines process them.
    pub const ALL: [AssetKind; 2] = [AssetKind::File, AssetKind::Image];

    /// Lowercase name of the kind (`"image"` or `"file"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Image => "image",
            AssetKind::File => "file",
        }
    }

    /// Archive sub-directory holding assets of this kind.
    pub fn dir_name(&self) -> &'static str {
        match self {
            AssetKind::Image => IMAGES_DIR,
            AssetKind::File => FILES_DIR,
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file discovered in an import source.
///
/// Immutable once discovered; the pipeline only ever reads it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalAsset {
    /// POSIX path relative to the working directory, e.g. `images/a.jpg`.
    /// This is also the key used to find the asset's sidecar entry.
    pub relative_path: String,
    /// Declared kind.
    pub kind: AssetKind,
}

impl LocalAsset {
    /// Create a new local asset reference.
    ///
    /// # Arguments
    /// * `relative_path` - POSIX path relative to the working directory
    /// * `kind` - Declared asset kind
    pub fn new(relative_path: impl Into<String>, kind: AssetKind) -> Self {
        Self {
            relative_path: relative_path.into(),
            kind,
        }
    }

    /// Resolve the asset to a host path under `working_path`.
    ///
    /// # Errors
    /// Returns `PathError::PathOutsideRoot` if the relative path escapes
    /// the working directory.
    pub fn resolve(&self, working_path: &Path) -> Result<PathBuf, PathError> {
        resolve_relative_path(&self.relative_path, working_path)
    }

    /// File name component of the relative path.
    pub fn file_name(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }
}
