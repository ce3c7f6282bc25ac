//! Import orchestration.
//!
//! Resolves an import source, then runs one unit of work per asset over a
//! bounded pool: hash, existence check, upload if needed, sidecar lookup,
//! aspect write. Stages run strictly in that order within an asset; assets
//! complete in any order.
//!
//! # Example
//!
//! ```ignore
//! use rusty_assets_storage::{ImportOptions, ImportOrchestrator};
//!
//! let orchestrator = ImportOrchestrator::new(&store)
//!     .with_options(ImportOptions::default().with_replace_aspects(true));
//! let summary = orchestrator
//!     .import(Path::new("/exports/media.tar.gz"), Some(&progress))
//!     .await?;
//! ```

use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use rusty_assets_common::{
    LocalAsset, ProgressCallback, DEFAULT_CONCURRENCY, METADATA_MATERIALIZE_THRESHOLD,
};
use rusty_assets_filesystem::{
    find_metadata_entry, resolve_source, MetadataEntry, MetadataTable, ResolvedSource,
};
use serde::de::DeserializeOwned;

use crate::aspects::AspectWriter;
use crate::dedup::{DedupOutcome, DedupResolver};
use crate::error::{ImportError, StorageError, TransferError};
use crate::traits::AssetStore;
use crate::types::{
    AspectWrite, AssetOutcome, AssetWithAspects, ImportProgress, ImportSummary, ResolvedAsset,
};
use crate::upload::Uploader;

/// How the sidecar is consulted for per-asset lookups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MetadataMode {
    /// Materialize when the run has more than
    /// [`METADATA_MATERIALIZE_THRESHOLD`] assets, stream otherwise.
    #[default]
    Auto,
    /// Load the whole sidecar once before any asset is processed.
    Materialize,
    /// Scan the sidecar for each asset.
    Stream,
}

impl MetadataMode {
    /// Whether a run of `asset_count` assets loads the sidecar up front.
    pub fn materializes(self, asset_count: usize) -> bool {
        match self {
            MetadataMode::Auto => asset_count > METADATA_MATERIALIZE_THRESHOLD,
            MetadataMode::Materialize => true,
            MetadataMode::Stream => false,
        }
    }
}

/// Options for import runs.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Maximum assets processed concurrently.
    pub max_concurrency: usize,
    /// Overwrite aspects on assets that already exist in the store.
    pub replace_aspects: bool,
    /// Sidecar access strategy.
    pub metadata_mode: MetadataMode,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_CONCURRENCY,
            replace_aspects: false,
            metadata_mode: MetadataMode::default(),
        }
    }
}

impl ImportOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum concurrency.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Set whether existing assets get their aspects replaced.
    pub fn with_replace_aspects(mut self, replace_aspects: bool) -> Self {
        self.replace_aspects = replace_aspects;
        self
    }

    /// Set the sidecar access strategy.
    pub fn with_metadata_mode(mut self, metadata_mode: MetadataMode) -> Self {
        self.metadata_mode = metadata_mode;
        self
    }
}

/// Sidecar lookup prepared once per run.
enum MetadataLookup<A> {
    /// Fully loaded index.
    Table(MetadataTable<A>),
    /// Sidecar scanned per lookup.
    Stream(PathBuf),
}

impl<A> MetadataLookup<A>
where
    A: DeserializeOwned + Clone + Send + 'static,
{
    async fn aspects_for(&self, filename: &str) -> Result<Option<A>, StorageError> {
        match self {
            MetadataLookup::Table(table) => Ok(table.aspects(filename)?.cloned()),
            MetadataLookup::Stream(path) => {
                let path: PathBuf = path.clone();
                let filename: String = filename.to_string();
                let entry: Option<MetadataEntry<A>> = tokio::task::spawn_blocking(move || {
                    find_metadata_entry::<A>(&path, &filename)
                })
                .await
                .map_err(|e| StorageError::Other {
                    message: format!("Metadata lookup task failed: {}", e),
                })??;
                Ok(entry.and_then(|entry| entry.aspects))
            }
        }
    }
}

/// Result of one asset's unit of work.
struct AssetReport {
    filename: String,
    outcome: AssetOutcome,
    aspects: Option<AspectWrite>,
    error: Option<TransferError>,
}

impl AssetReport {
    fn finished(filename: String, outcome: AssetOutcome, aspects: Option<AspectWrite>) -> Self {
        Self {
            filename,
            outcome,
            aspects,
            error: None,
        }
    }

    fn failed(filename: String, error: StorageError) -> Self {
        let error: TransferError = TransferError::new(filename.clone(), error);
        Self {
            filename,
            outcome: AssetOutcome::Failed,
            aspects: None,
            error: Some(error),
        }
    }
}

fn task_failed(err: tokio::task::JoinError) -> ImportError {
    ImportError::TaskFailed {
        message: err.to_string(),
    }
}

/// Imports assets and their aspects into an [`AssetStore`].
pub struct ImportOrchestrator<'a, C: AssetStore> {
    /// The remote store.
    client: &'a C,
    /// Import options.
    options: ImportOptions,
}

impl<'a, C> ImportOrchestrator<'a, C>
where
    C: AssetStore,
    C::Aspects: DeserializeOwned + Clone,
{
    /// Create a new import orchestrator with default options.
    ///
    /// # Arguments
    /// * `client` - Remote store shared by every worker
    pub fn new(client: &'a C) -> Self {
        Self {
            client,
            options: ImportOptions::default(),
        }
    }

    /// Set import options.
    pub fn with_options(mut self, options: ImportOptions) -> Self {
        self.options = options;
        self
    }

    /// Import a directory, tar, or tar.gz source.
    ///
    /// The extraction directory of an archive source is removed before this
    /// returns, whether the run succeeded or not.
    ///
    /// # Arguments
    /// * `source` - Path to the import source
    /// * `progress` - Optional callback, invoked once per completed asset
    ///
    /// # Returns
    /// Summary of the run. Per-asset failures are listed in
    /// `ImportSummary::errors` and do not abort the run.
    ///
    /// # Errors
    /// Fatal conditions only: unreadable source, missing sidecar, no
    /// assets, or a sidecar that cannot be opened.
    pub async fn import(
        &self,
        source: &Path,
        progress: Option<&dyn ProgressCallback<ImportProgress>>,
    ) -> Result<ImportSummary, ImportError> {
        let source_path: PathBuf = source.to_path_buf();
        let resolved: ResolvedSource =
            tokio::task::spawn_blocking(move || resolve_source(&source_path))
                .await
                .map_err(task_failed)?
                .map_err(ImportError::Source)?;

        let result: Result<ImportSummary, ImportError> =
            self.import_resolved(&resolved, progress).await;

        if resolved.is_extracted() {
            let import_root: String = resolved.import_root.display().to_string();
            match tokio::task::spawn_blocking(move || resolved.close()).await {
                Ok(Ok(())) => log::debug!("Removed extraction directory {}", import_root),
                Ok(Err(e)) => log::warn!("Failed to remove extraction directory: {}", e),
                Err(e) => log::warn!("Failed to remove extraction directory {}: {}", import_root, e),
            }
        }

        result
    }

    /// Import from an already resolved source.
    ///
    /// The caller keeps ownership of `resolved` and its extraction directory.
    pub async fn import_resolved(
        &self,
        resolved: &ResolvedSource,
        progress: Option<&dyn ProgressCallback<ImportProgress>>,
    ) -> Result<ImportSummary, ImportError> {
        let Some(metadata_path) = resolved.metadata_path.clone() else {
            return Err(ImportError::MissingSidecar {
                path: resolved.import_root.display().to_string(),
            });
        };

        let assets: Vec<LocalAsset> = resolved.assets();
        if assets.is_empty() {
            return Err(ImportError::NoAssets {
                path: resolved.working_path.display().to_string(),
            });
        }

        log::info!(
            "Importing {} assets ({} files, {} images) from {}",
            assets.len(),
            resolved.files.len(),
            resolved.images.len(),
            resolved.working_path.display()
        );

        let lookup: MetadataLookup<C::Aspects> =
            self.prepare_metadata(metadata_path, assets.len()).await?;

        let total: u64 = assets.len() as u64;
        let mut summary: ImportSummary = ImportSummary::new(total);

        let dedup: DedupResolver<'_, C> = DedupResolver::new(self.client, &resolved.working_path);
        let uploader: Uploader<'_, C> = Uploader::new(self.client);
        let writer: AspectWriter<'_, C> =
            AspectWriter::new(self.client, self.options.replace_aspects);
        let (dedup, uploader, writer, lookup) = (&dedup, &uploader, &writer, &lookup);

        let max_concurrency: usize = self.options.max_concurrency.max(1);
        let mut reports = stream::iter(assets)
            .map(move |asset: LocalAsset| {
                Self::process_asset(asset, dedup, uploader, writer, lookup)
            })
            .buffer_unordered(max_concurrency);

        let mut completed: u64 = 0;
        while let Some(report) = reports.next().await {
            completed += 1;
            summary.record_outcome(report.outcome);
            if let Some(write) = report.aspects {
                summary.record_aspects(write);
            }
            if let Some(error) = report.error {
                log::warn!("[Asset {}] Import failed: {}", error.key, error.error);
                summary.errors.push(error);
            }

            if let Some(cb) = progress {
                cb.on_progress(&ImportProgress {
                    completed,
                    total,
                    last_filename: report.filename,
                    outcome: report.outcome,
                });
            }
        }

        log::info!(
            "Import finished: {} uploaded, {} existing, {} dropped on conflict, {} failed",
            summary.uploaded,
            summary.existing,
            summary.dropped_conflicts,
            summary.errors.len()
        );

        Ok(summary)
    }

    /// Load the sidecar up front or set up per-asset scans.
    async fn prepare_metadata(
        &self,
        metadata_path: PathBuf,
        asset_count: usize,
    ) -> Result<MetadataLookup<C::Aspects>, ImportError> {
        if !self.options.metadata_mode.materializes(asset_count) {
            log::debug!("Streaming metadata lookups from {}", metadata_path.display());
            return Ok(MetadataLookup::Stream(metadata_path));
        }

        let table: MetadataTable<C::Aspects> =
            tokio::task::spawn_blocking(move || MetadataTable::load(&metadata_path))
                .await
                .map_err(task_failed)?
                .map_err(ImportError::Metadata)?;

        log::debug!(
            "Loaded {} metadata entries ({} duplicate filenames ignored)",
            table.len(),
            table.duplicate_count()
        );
        if let Some(e) = table.read_error() {
            log::warn!(
                "Metadata sidecar read stopped early; assets without an earlier entry will fail: {}",
                e
            );
        }
        Ok(MetadataLookup::Table(table))
    }

    /// Run every stage for one asset.
    async fn process_asset(
        asset: LocalAsset,
        dedup: &DedupResolver<'_, C>,
        uploader: &Uploader<'_, C>,
        writer: &AspectWriter<'_, C>,
        lookup: &MetadataLookup<C::Aspects>,
    ) -> AssetReport {
        let filename: String = asset.relative_path.clone();

        let resolved: ResolvedAsset = match dedup.resolve(&asset).await {
            Ok(DedupOutcome::Existing(resolved)) => resolved,
            Ok(DedupOutcome::NeedsUpload(pending)) => match uploader.upload(&pending).await {
                Ok(Some(resolved)) => resolved,
                Ok(None) => {
                    return AssetReport::finished(filename, AssetOutcome::DroppedConflict, None)
                }
                Err(e) => return AssetReport::failed(filename, e),
            },
            Err(e) => return AssetReport::failed(filename, e),
        };

        let outcome: AssetOutcome = if resolved.is_existing_asset {
            AssetOutcome::Existing
        } else {
            AssetOutcome::Uploaded
        };

        let aspects: Option<C::Aspects> = match lookup.aspects_for(&filename).await {
            Ok(aspects) => aspects,
            Err(e) => return AssetReport::failed(filename, e),
        };

        let item: AssetWithAspects<C::Aspects> = AssetWithAspects {
            asset: resolved,
            aspects,
        };
        match writer.write(&item).await {
            Ok(write) => AssetReport::finished(filename, outcome, Some(write)),
            Err(e) => AssetReport::failed(filename, e),
        }
    }
}
