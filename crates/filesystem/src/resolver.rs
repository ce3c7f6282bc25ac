//! Import source resolution.
//!
//! Normalizes an import path into a working directory:
//!
//! - A directory is used as is.
//! - Any other file is sniffed: gzip is decompressed if present, and a tar
//!   stream is extracted into a fresh temporary directory.
//!
//! The working directory is then searched for the `data.ndjson` sidecar
//! (at most two levels deep) and its `files/` and `images/` children are
//! listed. The temporary directory, if one was created, belongs to the
//! returned [`ResolvedSource`] and is removed when it is dropped.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use rusty_assets_common::{
    relative_posix_path, AssetKind, LocalAsset, METADATA_FILE_NAME, METADATA_SEARCH_DEPTH,
    TEMP_DIR_PREFIX,
};
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::archive::{decompress_maybe, unpack_maybe};
use crate::error::FileSystemError;

/// An import source normalized to a working directory.
#[derive(Debug)]
pub struct ResolvedSource {
    /// Generic file assets, as POSIX paths relative to `working_path`
    /// (e.g. `files/report.pdf`), sorted by name.
    pub files: Vec<String>,
    /// Image assets, as POSIX paths relative to `working_path`, sorted by name.
    pub images: Vec<String>,
    /// Absolute path of the metadata sidecar, if one was found.
    pub metadata_path: Option<PathBuf>,
    /// Directory the asset paths are relative to: the sidecar's directory,
    /// or `import_root` when there is no sidecar.
    pub working_path: PathBuf,
    /// The input directory, or the extraction directory for archives.
    pub import_root: PathBuf,
    /// Extraction directory, removed on drop.
    temp_dir: Option<TempDir>,
}

impl ResolvedSource {
    /// All discovered assets: files first, then images.
    pub fn assets(&self) -> Vec<LocalAsset> {
        self.files
            .iter()
            .map(|path| LocalAsset::new(path.clone(), AssetKind::File))
            .chain(
                self.images
                    .iter()
                    .map(|path| LocalAsset::new(path.clone(), AssetKind::Image)),
            )
            .collect()
    }

    /// Total number of discovered assets.
    pub fn asset_count(&self) -> usize {
        self.files.len() + self.images.len()
    }

    /// Whether the source was extracted into a temporary directory.
    pub fn is_extracted(&self) -> bool {
        self.temp_dir.is_some()
    }

    /// Remove the extraction directory now, reporting any failure.
    ///
    /// Dropping the source also removes it, but silently.
    pub fn close(mut self) -> Result<(), FileSystemError> {
        match self.temp_dir.take() {
            Some(dir) => {
                let path: String = dir.path().display().to_string();
                dir.close().map_err(|e| FileSystemError::from_io(path, e))
            }
            None => Ok(()),
        }
    }
}

/// Resolve an import path into a working directory with asset listings.
///
/// # Arguments
/// * `source` - Directory, tar archive, or gzip-compressed tar archive
///
/// # Returns
/// The resolved source. A missing sidecar is reported as
/// `metadata_path: None`; callers that require one must check.
///
/// # Errors
/// Returns error if the source cannot be read or the archive is corrupt.
pub fn resolve_source(source: &Path) -> Result<ResolvedSource, FileSystemError> {
    let metadata: std::fs::Metadata = std::fs::metadata(source)
        .map_err(|e| FileSystemError::from_io(source.display().to_string(), e))?;

    let temp_dir: Option<TempDir> = if metadata.is_dir() {
        None
    } else {
        Some(extract_to_temp_dir(source)?)
    };

    let import_root: PathBuf = match temp_dir {
        Some(ref dir) => dir.path().to_path_buf(),
        None => source.to_path_buf(),
    };

    let metadata_path: Option<PathBuf> = find_metadata_file(&import_root)?;
    match metadata_path {
        Some(ref path) => log::debug!("Found metadata sidecar {}", path.display()),
        None => log::debug!("No {} below {}", METADATA_FILE_NAME, import_root.display()),
    }

    let working_path: PathBuf = metadata_path
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| import_root.clone());

    let files: Vec<String> = list_assets(&working_path, AssetKind::File)?;
    let images: Vec<String> = list_assets(&working_path, AssetKind::Image)?;

    Ok(ResolvedSource {
        files,
        images,
        metadata_path,
        working_path,
        import_root,
        temp_dir,
    })
}

/// Extract an archive file into a new temporary directory.
///
/// A file that turns out not to be a tar archive yields an empty directory.
fn extract_to_temp_dir(source: &Path) -> Result<TempDir, FileSystemError> {
    let label: String = source.display().to_string();

    let temp_dir: TempDir = tempfile::Builder::new()
        .prefix(TEMP_DIR_PREFIX)
        .tempdir()
        .map_err(|e| FileSystemError::from_io(std::env::temp_dir().display().to_string(), e))?;

    let file: File = File::open(source).map_err(|e| FileSystemError::from_io(label.clone(), e))?;
    let reader: Box<dyn Read> =
        decompress_maybe(file).map_err(|e| FileSystemError::from_io(label.clone(), e))?;

    if unpack_maybe(reader, temp_dir.path(), &label)? {
        log::debug!("Extracted {} into {}", label, temp_dir.path().display());
    } else {
        log::warn!("{} is not a tar archive, nothing extracted", label);
    }

    Ok(temp_dir)
}

/// Find the shallowest `data.ndjson` at most [`METADATA_SEARCH_DEPTH`] levels below `root`.
///
/// Ties at the same depth resolve to the first path in sorted order.
pub fn find_metadata_file(root: &Path) -> Result<Option<PathBuf>, FileSystemError> {
    let mut best: Option<(usize, PathBuf)> = None;

    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(METADATA_SEARCH_DEPTH)
        .sort_by_file_name()
    {
        let entry: walkdir::DirEntry = entry?;
        if !entry.file_type().is_file() || entry.file_name() != METADATA_FILE_NAME {
            continue;
        }

        let is_shallower: bool = match best {
            Some((depth, _)) => entry.depth() < depth,
            None => true,
        };
        if is_shallower {
            best = Some((entry.depth(), entry.into_path()));
        }
    }

    Ok(best.map(|(_, path)| path))
}

/// List the regular files directly inside `<working_path>/<kind dir>`.
///
/// Hidden entries, directories and symlinks are skipped; symlinks in an
/// untrusted archive could otherwise point anywhere on the host.
fn list_assets(working_path: &Path, kind: AssetKind) -> Result<Vec<String>, FileSystemError> {
    let dir: PathBuf = working_path.join(kind.dir_name());
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut assets: Vec<String> = Vec::new();
    for entry in WalkDir::new(&dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry: walkdir::DirEntry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let Some(name) = entry.file_name().to_str() else {
            log::warn!("Skipping non UTF-8 file name {}", entry.path().display());
            continue;
        };
        if name.starts_with('.') {
            continue;
        }

        assets.push(relative_posix_path(entry.path(), working_path)?);
    }

    Ok(assets)
}
