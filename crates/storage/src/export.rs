//! Export orchestration.
//!
//! Writes the same layout an import reads: `files/`, `images/` and a
//! `data.ndjson` sidecar, either into a directory or packed into a tar
//! archive. Downloads run over a bounded pool; the sidecar is written in
//! listing order once every download has finished, so it does not depend
//! on completion order.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use rusty_assets_common::{
    resolve_relative_path, AssetKind, ProgressCallback, DEFAULT_CONCURRENCY,
    EXPORT_TEMP_DIR_PREFIX, METADATA_FILE_NAME,
};
use rusty_assets_filesystem::{
    pack_directory, ArchiveFormat, FileSystemError, MetadataEntry, NdjsonWriter,
};
use serde::Serialize;
use serde_json::Value;
use tempfile::TempDir;

use crate::error::{ExportError, StorageError, TransferError};
use crate::traits::AssetStore;
use crate::types::{ExportProgress, ExportSummary, RemoteAsset};

/// Options for export runs.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Maximum concurrent downloads.
    pub max_concurrency: usize,
    /// Asset kinds to export, in sidecar order.
    pub kinds: Vec<AssetKind>,
    /// Archive format; derived from the destination name when unset.
    pub format: Option<ArchiveFormat>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_CONCURRENCY,
            kinds: AssetKind::ALL.to_vec(),
            format: None,
        }
    }
}

impl ExportOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum concurrency.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Restrict the export to these kinds.
    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = AssetKind>) -> Self {
        self.kinds = kinds.into_iter().collect();
        self
    }

    /// Force an archive format regardless of the destination name.
    pub fn with_format(mut self, format: ArchiveFormat) -> Self {
        self.format = Some(format);
        self
    }
}

/// Whether an aspects value is worth a sidecar line.
fn has_content(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

fn task_failed(err: tokio::task::JoinError) -> ExportError {
    ExportError::TaskFailed {
        message: err.to_string(),
    }
}

/// Exports the assets of an [`AssetStore`] to a directory or archive.
pub struct ExportOrchestrator<'a, C: AssetStore> {
    /// The remote store.
    client: &'a C,
    /// Export options.
    options: ExportOptions,
}

impl<'a, C> ExportOrchestrator<'a, C>
where
    C: AssetStore,
    C::Aspects: Serialize,
{
    /// Create a new export orchestrator with default options.
    pub fn new(client: &'a C) -> Self {
        Self {
            client,
            options: ExportOptions::default(),
        }
    }

    /// Set export options.
    pub fn with_options(mut self, options: ExportOptions) -> Self {
        self.options = options;
        self
    }

    /// Export to `destination`.
    ///
    /// A destination ending in `.tar`, `.tar.gz` or `.tgz` (or any
    /// destination when a format is set in the options) is staged in a
    /// temporary directory and packed. Any other destination is written in
    /// place and must be empty or absent.
    ///
    /// # Arguments
    /// * `destination` - Output directory or archive path
    /// * `progress` - Optional callback, invoked once per finished download
    ///
    /// # Errors
    /// Listing failures, a non-empty destination directory, and sidecar or
    /// archive write failures abort the export. Download failures are
    /// recorded in `ExportSummary::errors`.
    pub async fn export(
        &self,
        destination: &Path,
        progress: Option<&dyn ProgressCallback<ExportProgress>>,
    ) -> Result<ExportSummary, ExportError> {
        let format: Option<ArchiveFormat> = self
            .options
            .format
            .or_else(|| ArchiveFormat::from_path(destination));

        let Some(format) = format else {
            prepare_directory(destination).await?;
            return self.export_tree(destination, progress).await;
        };

        let staging: TempDir = tempfile::Builder::new()
            .prefix(EXPORT_TEMP_DIR_PREFIX)
            .tempdir()
            .map_err(|e| FileSystemError::from_io(std::env::temp_dir().display().to_string(), e))?;

        let mut summary: ExportSummary = self.export_tree(staging.path(), progress).await?;

        let archive_path: PathBuf = destination.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<(), FileSystemError> {
            pack_directory(staging.path(), &archive_path, format)?;
            let staging_path: String = staging.path().display().to_string();
            staging
                .close()
                .map_err(|e| FileSystemError::from_io(staging_path, e))
        })
        .await
        .map_err(task_failed)??;

        log::info!("Packed export into {}", destination.display());
        summary.output_path = destination.to_path_buf();
        Ok(summary)
    }

    /// Download every listed asset under `root` and write the sidecar.
    async fn export_tree(
        &self,
        root: &Path,
        progress: Option<&dyn ProgressCallback<ExportProgress>>,
    ) -> Result<ExportSummary, ExportError> {
        let mut seen: HashSet<AssetKind> = HashSet::new();
        let mut listed: Vec<RemoteAsset<C::Aspects>> = Vec::new();
        for kind in self.options.kinds.iter().copied() {
            if !seen.insert(kind) {
                continue;
            }
            let assets: Vec<RemoteAsset<C::Aspects>> = self.client.list_assets(kind).await?;
            log::debug!("Listed {} {} assets", assets.len(), kind);
            listed.extend(assets);

            let dir: PathBuf = root.join(kind.dir_name());
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| FileSystemError::from_io(dir.display().to_string(), e))?;
        }

        let total: u64 = listed.len() as u64;
        let mut summary: ExportSummary = ExportSummary {
            total_assets: total,
            output_path: root.to_path_buf(),
            ..Default::default()
        };
        log::info!("Exporting {} assets to {}", total, root.display());

        let max_concurrency: usize = self.options.max_concurrency.max(1);
        let mut downloads = stream::iter(listed.iter().enumerate())
            .map(|(index, asset)| async move {
                let filename: String = asset.export_filename();
                let result: Result<u64, StorageError> =
                    self.download_one(root, asset, &filename).await;
                (index, filename, result)
            })
            .buffer_unordered(max_concurrency);

        let mut downloaded: Vec<bool> = vec![false; listed.len()];
        let mut completed: u64 = 0;
        while let Some((index, filename, result)) = downloads.next().await {
            completed += 1;
            match result {
                Ok(bytes) => {
                    downloaded[index] = true;
                    summary.exported += 1;
                    summary.bytes_written += bytes;
                }
                Err(e) => {
                    log::warn!("[Asset {}] Export failed: {}", filename, e);
                    summary
                        .errors
                        .push(TransferError::new(listed[index].document_id.clone(), e));
                }
            }

            if let Some(cb) = progress {
                cb.on_progress(&ExportProgress {
                    completed,
                    total,
                    last_filename: filename,
                });
            }
        }

        let mut lines: Vec<MetadataEntry<Value>> = Vec::new();
        for (asset, _) in listed.iter().zip(&downloaded).filter(|(_, ok)| **ok) {
            let Some(aspects) = asset.aspects.as_ref() else {
                continue;
            };
            match serde_json::to_value(aspects) {
                Ok(value) if has_content(&value) => {
                    lines.push(MetadataEntry::new(asset.export_filename(), Some(value)))
                }
                Ok(_) => {}
                Err(e) => summary.errors.push(TransferError::new(
                    asset.document_id.clone(),
                    StorageError::InvalidData {
                        message: format!("Aspects could not be serialized: {}", e),
                    },
                )),
            }
        }

        let sidecar_path: PathBuf = root.join(METADATA_FILE_NAME);
        summary.sidecar_lines = tokio::task::spawn_blocking(move || -> Result<u64, FileSystemError> {
            let mut writer = NdjsonWriter::create(&sidecar_path)?;
            for line in &lines {
                writer.write_line(line)?;
            }
            let written: u64 = writer.lines_written();
            writer.finish()?;
            Ok(written)
        })
        .await
        .map_err(task_failed)??;

        log::info!(
            "Export finished: {} of {} assets, {} bytes, {} sidecar lines, {} failed",
            summary.exported,
            summary.total_assets,
            summary.bytes_written,
            summary.sidecar_lines,
            summary.errors.len()
        );

        Ok(summary)
    }

    /// Download one asset, removing any partial file on failure.
    async fn download_one(
        &self,
        root: &Path,
        asset: &RemoteAsset<C::Aspects>,
        filename: &str,
    ) -> Result<u64, StorageError> {
        let path: PathBuf = resolve_relative_path(filename, root)?;

        match self.client.download(&asset.document_id, &path).await {
            Ok(bytes) => {
                log::debug!("[Asset {}] Downloaded {} bytes", filename, bytes);
                Ok(bytes)
            }
            Err(e) => {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => log::debug!("[Asset {}] Removed partial download", filename),
                    Err(remove) if remove.kind() == std::io::ErrorKind::NotFound => {}
                    Err(remove) => log::warn!(
                        "[Asset {}] Failed to remove partial download: {}",
                        filename,
                        remove
                    ),
                }
                Err(e)
            }
        }
    }
}

/// Create `path` if absent; fail if it already has content.
async fn prepare_directory(path: &Path) -> Result<(), ExportError> {
    let to_fs_error = |e: std::io::Error| FileSystemError::from_io(path.display().to_string(), e);

    match tokio::fs::read_dir(path).await {
        Ok(mut entries) => {
            if entries.next_entry().await.map_err(to_fs_error)?.is_some() {
                return Err(ExportError::DestinationNotEmpty {
                    path: path.display().to_string(),
                });
            }
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tokio::fs::create_dir_all(path).await.map_err(to_fs_error)?;
            Ok(())
        }
        Err(e) => Err(to_fs_error(e).into()),
    }
}
