//! Upload stage for assets the store does not have yet.
//!
//! Another client may create the same asset between the existence check
//! and the upload. The store reports that as a conflict, and the asset is
//! dropped from the run rather than failed: whoever won the race owns it.

use rusty_assets_common::AssetKind;

use crate::dedup::PendingUpload;
use crate::error::StorageError;
use crate::traits::AssetStore;
use crate::types::ResolvedAsset;

/// Uploads pending assets through an [`AssetStore`].
pub struct Uploader<'a, C: AssetStore> {
    /// The remote store.
    client: &'a C,
}

impl<'a, C: AssetStore> Uploader<'a, C> {
    /// Create a new uploader.
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Upload one asset.
    ///
    /// # Arguments
    /// * `pending` - Asset classified as missing by the dedup stage
    ///
    /// # Returns
    /// The new asset, or `None` if the store reported a conflict.
    ///
    /// # Errors
    /// Every store error other than a conflict.
    pub async fn upload(
        &self,
        pending: &PendingUpload,
    ) -> Result<Option<ResolvedAsset>, StorageError> {
        let kind: AssetKind = pending.asset.kind;
        let filename: &str = &pending.asset.relative_path;

        log::debug!("[Asset {}] Uploading {} asset", filename, kind);

        match self.client.upload(kind, &pending.path, filename).await {
            Ok(document_id) => {
                log::debug!("[Asset {}] Uploaded as {}", filename, document_id);
                Ok(Some(ResolvedAsset::uploaded(
                    document_id,
                    filename,
                    pending.content_digest.clone(),
                    kind,
                )))
            }
            Err(err) if err.is_conflict() => {
                log::debug!("[Asset {}] Dropped after upload conflict: {}", filename, err);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryAssetStore;
    use rusty_assets_common::{hash_bytes, LocalAsset};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn make_pending(dir: &TempDir, relative: &str, data: &[u8]) -> PendingUpload {
        let path: PathBuf = dir.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, data).unwrap();
        PendingUpload {
            asset: LocalAsset::new(relative, AssetKind::Image),
            path,
            content_digest: hash_bytes(data),
        }
    }

    #[tokio::test]
    async fn test_upload_returns_new_asset() {
        let dir: TempDir = TempDir::new().unwrap();
        let store: MemoryAssetStore = MemoryAssetStore::new();
        let pending: PendingUpload = make_pending(&dir, "images/a.jpg", b"aaa");

        let resolved: ResolvedAsset = Uploader::new(&store)
            .upload(&pending)
            .await
            .unwrap()
            .unwrap();

        assert!(!resolved.is_existing_asset);
        assert_eq!(resolved.asset_ids.len(), 1);
        assert_eq!(resolved.content_digest, hash_bytes(b"aaa"));
        assert_eq!(store.stats().uploads, 1);
    }

    #[tokio::test]
    async fn test_conflict_is_dropped() {
        let dir: TempDir = TempDir::new().unwrap();
        let store: MemoryAssetStore = MemoryAssetStore::new();
        store.insert_asset(AssetKind::Image, b"aaa".to_vec(), None, None);
        let pending: PendingUpload = make_pending(&dir, "images/a.jpg", b"aaa");

        let result: Option<ResolvedAsset> = Uploader::new(&store).upload(&pending).await.unwrap();

        assert!(result.is_none());
        assert_eq!(store.stats().uploads, 0);
    }

    #[tokio::test]
    async fn test_other_errors_propagate() {
        let dir: TempDir = TempDir::new().unwrap();
        let store: MemoryAssetStore = MemoryAssetStore::new();
        store.inject_upload_error(
            "images/a.jpg",
            StorageError::AccessDenied {
                key: "images/a.jpg".to_string(),
                message: "read-only dataset".to_string(),
            },
        );
        let pending: PendingUpload = make_pending(&dir, "images/a.jpg", b"aaa");

        let result = Uploader::new(&store).upload(&pending).await;

        assert!(matches!(result, Err(StorageError::AccessDenied { .. })));
    }
}
