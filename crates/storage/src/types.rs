//! Shared data structures for import and export runs.

use std::path::PathBuf;

use rusty_assets_common::AssetKind;

use crate::error::TransferError;

/// A local asset after dedup classification.
///
/// `is_existing_asset` implies `asset_ids` is non-empty. A newly uploaded
/// asset has exactly one ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    /// Remote documents referencing this binary, in store order.
    pub asset_ids: Vec<String>,
    /// Path of the asset in the import source, e.g. `images/a.jpg`.
    pub original_filename: String,
    /// Hex SHA-1 of the asset bytes.
    pub content_digest: String,
    /// Declared asset kind.
    pub kind: AssetKind,
    /// Whether the asset was already present before this run.
    pub is_existing_asset: bool,
}

impl ResolvedAsset {
    /// An asset found in the store by digest.
    pub fn existing(
        asset_ids: Vec<String>,
        original_filename: impl Into<String>,
        content_digest: impl Into<String>,
        kind: AssetKind,
    ) -> Self {
        Self {
            asset_ids,
            original_filename: original_filename.into(),
            content_digest: content_digest.into(),
            kind,
            is_existing_asset: true,
        }
    }

    /// An asset created by this run.
    pub fn uploaded(
        document_id: impl Into<String>,
        original_filename: impl Into<String>,
        content_digest: impl Into<String>,
        kind: AssetKind,
    ) -> Self {
        Self {
            asset_ids: vec![document_id.into()],
            original_filename: original_filename.into(),
            content_digest: content_digest.into(),
            kind,
            is_existing_asset: false,
        }
    }
}

/// A resolved asset paired with the aspects found for it in the sidecar.
///
/// `aspects` is `None` when the sidecar has no entry for the asset, or the
/// entry has no `aspects` key. An explicit `null` is `Some`.
#[derive(Debug, Clone)]
pub struct AssetWithAspects<A> {
    pub asset: ResolvedAsset,
    pub aspects: Option<A>,
}

/// What happened to one asset's binary during an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetOutcome {
    /// Uploaded as a new asset.
    Uploaded,
    /// Already present in the store; nothing uploaded.
    Existing,
    /// The store reported a conflict on upload; the asset is left to
    /// whoever created it.
    DroppedConflict,
    /// A stage failed; see the summary's errors.
    Failed,
}

/// Result of the aspect stage for one asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AspectWrite {
    /// One transaction set aspects on this many documents.
    Written { documents: usize },
    /// No write was issued.
    Skipped(AspectSkip),
}

/// Why the aspect stage issued no write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AspectSkip {
    /// The asset already existed and replacement was not requested.
    PreservedExisting,
    /// The sidecar has no aspects for the asset.
    NoAspects,
}

/// Progress event emitted once per completed asset.
#[derive(Debug, Clone)]
pub struct ImportProgress {
    /// Assets completed so far, including this one.
    pub completed: u64,
    /// Assets in the run.
    pub total: u64,
    /// Source path of the asset that just completed.
    pub last_filename: String,
    /// How that asset ended.
    pub outcome: AssetOutcome,
}

/// Aggregated result of an import run.
#[derive(Debug, Clone, Default)]
pub struct ImportSummary {
    /// Assets discovered in the source.
    pub total_assets: u64,
    /// Assets uploaded as new.
    pub uploaded: u64,
    /// Assets already present in the store.
    pub existing: u64,
    /// Assets dropped because the store reported a conflict on upload.
    pub dropped_conflicts: u64,
    /// Aspect transactions committed.
    pub aspects_written: u64,
    /// Assets for which no aspect write was needed.
    pub aspects_skipped: u64,
    /// Per-asset failures (non-fatal).
    pub errors: Vec<TransferError>,
}

impl ImportSummary {
    /// Create an empty summary for a run of `total_assets`.
    pub fn new(total_assets: u64) -> Self {
        Self {
            total_assets,
            ..Default::default()
        }
    }

    /// Assets that finished without a recorded failure.
    pub fn succeeded(&self) -> u64 {
        self.uploaded + self.existing + self.dropped_conflicts
    }

    /// Whether every asset finished without a recorded failure.
    pub fn is_complete_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Record one asset's binary outcome.
    pub fn record_outcome(&mut self, outcome: AssetOutcome) {
        match outcome {
            AssetOutcome::Uploaded => self.uploaded += 1,
            AssetOutcome::Existing => self.existing += 1,
            AssetOutcome::DroppedConflict => self.dropped_conflicts += 1,
            AssetOutcome::Failed => {}
        }
    }

    /// Record one asset's aspect stage result.
    pub fn record_aspects(&mut self, write: AspectWrite) {
        match write {
            AspectWrite::Written { .. } => self.aspects_written += 1,
            AspectWrite::Skipped(_) => self.aspects_skipped += 1,
        }
    }
}

/// An asset document as listed by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteAsset<A> {
    /// Document ID.
    pub document_id: String,
    /// Asset kind.
    pub kind: AssetKind,
    /// File extension without the dot, if known.
    pub extension: Option<String>,
    /// Aspects currently set on the document.
    pub aspects: Option<A>,
}

impl<A> RemoteAsset<A> {
    /// Deterministic archive path for this asset.
    ///
    /// `<images|files>/<document id>[.<extension>]`; path separators in the
    /// ID are replaced so the name stays a single component, and a leading
    /// dot is escaped so the file is not hidden from a later import.
    pub fn export_filename(&self) -> String {
        let mut stem: String = self
            .document_id
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        if stem.is_empty() || stem.starts_with('.') {
            stem.insert(0, '_');
        }

        match self
            .extension
            .as_deref()
            .map(|ext| ext.trim_start_matches('.'))
            .filter(|ext| !ext.is_empty())
        {
            Some(ext) => format!("{}/{}.{}", self.kind.dir_name(), stem, ext),
            None => format!("{}/{}", self.kind.dir_name(), stem),
        }
    }
}

/// Progress event emitted once per downloaded asset.
#[derive(Debug, Clone)]
pub struct ExportProgress {
    /// Assets completed so far, including this one.
    pub completed: u64,
    /// Assets in the export.
    pub total: u64,
    /// Archive path of the asset that just completed.
    pub last_filename: String,
}

/// Aggregated result of an export run.
#[derive(Debug, Clone, Default)]
pub struct ExportSummary {
    /// Assets listed by the store.
    pub total_assets: u64,
    /// Assets downloaded.
    pub exported: u64,
    /// Total bytes downloaded.
    pub bytes_written: u64,
    /// Lines written to the sidecar.
    pub sidecar_lines: u64,
    /// The directory or archive that was written.
    pub output_path: PathBuf,
    /// Per-asset failures (non-fatal).
    pub errors: Vec<TransferError>,
}
