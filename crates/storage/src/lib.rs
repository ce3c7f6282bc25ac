//! Deduplicating import and export pipelines for remote asset stores.
//!
//! This crate moves assets between a local directory or tar archive and any
//! store implementing [`AssetStore`]:
//!
//! - **Import** ([`ImportOrchestrator`]) - hashes each local asset, skips
//!   content the store already has, uploads the rest, and applies the
//!   aspects found in the `data.ndjson` sidecar.
//! - **Export** ([`ExportOrchestrator`]) - downloads every asset of the
//!   requested kinds and writes a sidecar, optionally packed as a tarball.
//!
//! The stages are exposed individually ([`DedupResolver`], [`Uploader`],
//! [`AspectWriter`]) for callers that drive their own pipeline.
//! [`MemoryAssetStore`] is an in-process store for tests and dry runs.

pub mod aspects;
pub mod dedup;
mod error;
pub mod export;
pub mod import;
pub mod memory;
mod traits;
mod types;
pub mod upload;

pub use aspects::AspectWriter;
pub use dedup::{DedupOutcome, DedupResolver, PendingUpload};
pub use error::{ExportError, ImportError, StorageError, TransferError};
pub use export::{ExportOptions, ExportOrchestrator};
pub use import::{ImportOptions, ImportOrchestrator, MetadataMode};
pub use memory::{MemoryAssetStore, StoreStats};
pub use traits::AssetStore;
pub use types::{
    AspectSkip, AspectWrite, AssetOutcome, AssetWithAspects, ExportProgress, ExportSummary,
    ImportProgress, ImportSummary, RemoteAsset, ResolvedAsset,
};
pub use upload::Uploader;
