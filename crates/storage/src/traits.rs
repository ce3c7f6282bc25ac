//! Remote asset store interface.

use std::path::Path;

use async_trait::async_trait;
use rusty_assets_common::AssetKind;

use crate::error::StorageError;
use crate::types::RemoteAsset;

/// Operations the pipelines need from a remote asset store.
///
/// Implementations are shared by every worker of a run and must be safe
/// for concurrent use.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Aspects payload stored on asset documents.
    ///
    /// Opaque to the pipelines; the sidecar is deserialized into this type.
    type Aspects: Send + Sync + 'static;

    /// Find the documents referencing an asset of `kind` with this digest.
    ///
    /// # Arguments
    /// * `kind` - Asset kind; digests are only unique within a kind
    /// * `digest` - Hex SHA-1 of the asset bytes
    ///
    /// # Returns
    /// Document IDs in store order; empty if no such asset exists.
    async fn query_by_digest(
        &self,
        kind: AssetKind,
        digest: &str,
    ) -> Result<Vec<String>, StorageError>;

    /// Upload a local file as a new asset.
    ///
    /// # Arguments
    /// * `kind` - Asset kind
    /// * `file_path` - Local file to stream
    /// * `original_filename` - Name recorded on the new asset
    ///
    /// # Returns
    /// The ID of the new asset document.
    ///
    /// # Errors
    /// `StorageError::Conflict` if an asset with the same content already
    /// exists; other variants for real failures.
    async fn upload(
        &self,
        kind: AssetKind,
        file_path: &Path,
        original_filename: &str,
    ) -> Result<String, StorageError>;

    /// Set the aspects field on every listed document in one transaction.
    ///
    /// Either all documents are updated or none are.
    async fn patch_aspects(
        &self,
        document_ids: &[String],
        aspects: &Self::Aspects,
    ) -> Result<(), StorageError>;

    /// List every asset document of `kind`.
    async fn list_assets(
        &self,
        kind: AssetKind,
    ) -> Result<Vec<RemoteAsset<Self::Aspects>>, StorageError>;

    /// Download an asset's bytes to a local file.
    ///
    /// # Returns
    /// Number of bytes written.
    async fn download(&self, document_id: &str, destination: &Path) -> Result<u64, StorageError>;
}
