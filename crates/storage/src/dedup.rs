//! Content-addressed existence checks.
//!
//! Each local asset is hashed once and looked up by digest, scoped by kind.
//! Assets the store already references skip the upload stage entirely,
//! which is what makes re-running an import cheap.

use std::path::{Path, PathBuf};

use rusty_assets_common::{hash_file_async, LocalAsset};

use crate::error::StorageError;
use crate::traits::AssetStore;
use crate::types::ResolvedAsset;

/// An asset the store does not have yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpload {
    /// The local asset.
    pub asset: LocalAsset,
    /// Host path of the asset file.
    pub path: PathBuf,
    /// Hex SHA-1 of the asset bytes.
    pub content_digest: String,
}

/// Result of classifying one local asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupOutcome {
    /// The store already references this content.
    Existing(ResolvedAsset),
    /// The content must be uploaded.
    NeedsUpload(PendingUpload),
}

/// Classifies local assets as present or missing in the remote store.
pub struct DedupResolver<'a, C: AssetStore> {
    /// The remote store.
    client: &'a C,
    /// Directory asset paths are relative to.
    working_path: &'a Path,
}

impl<'a, C: AssetStore> DedupResolver<'a, C> {
    /// Create a new resolver.
    ///
    /// # Arguments
    /// * `client` - Remote store
    /// * `working_path` - Directory the asset paths are relative to
    pub fn new(client: &'a C, working_path: &'a Path) -> Self {
        Self {
            client,
            working_path,
        }
    }

    /// Hash an asset and look up existing documents for its digest.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or the lookup fails.
    pub async fn resolve(&self, asset: &LocalAsset) -> Result<DedupOutcome, StorageError> {
        let path: PathBuf = asset.resolve(self.working_path)?;
        let digest: String = hash_file_async(&path)
            .await
            .map_err(|e| StorageError::from_io(path.display().to_string(), e))?;

        log::debug!(
            "[Asset {}] Checking for {} asset with hash {}",
            asset.relative_path,
            asset.kind,
            digest
        );

        let asset_ids: Vec<String> = self.client.query_by_digest(asset.kind, &digest).await?;

        if asset_ids.is_empty() {
            return Ok(DedupOutcome::NeedsUpload(PendingUpload {
                asset: asset.clone(),
                path,
                content_digest: digest,
            }));
        }

        Ok(DedupOutcome::Existing(ResolvedAsset::existing(
            asset_ids,
            asset.relative_path.clone(),
            digest,
            asset.kind,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryAssetStore;
    use rusty_assets_common::{hash_bytes, AssetKind};
    use tempfile::TempDir;

    fn write_asset(dir: &TempDir, relative: &str, data: &[u8]) {
        let path: PathBuf = dir.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, data).unwrap();
    }

    #[tokio::test]
    async fn test_unknown_digest_needs_upload() {
        let dir: TempDir = TempDir::new().unwrap();
        write_asset(&dir, "images/a.jpg", b"aaa");
        let store: MemoryAssetStore = MemoryAssetStore::new();

        let resolver = DedupResolver::new(&store, dir.path());
        let outcome: DedupOutcome = resolver
            .resolve(&LocalAsset::new("images/a.jpg", AssetKind::Image))
            .await
            .unwrap();

        match outcome {
            DedupOutcome::NeedsUpload(pending) => {
                assert_eq!(pending.content_digest, hash_bytes(b"aaa"));
                assert_eq!(pending.path, dir.path().join("images/a.jpg"));
            }
            other => panic!("expected upload, got {:?}", other),
        }
        assert_eq!(store.stats().queries, 1);
    }

    #[tokio::test]
    async fn test_known_digest_is_existing_with_all_ids() {
        let dir: TempDir = TempDir::new().unwrap();
        write_asset(&dir, "images/a.jpg", b"aaa");
        let store: MemoryAssetStore = MemoryAssetStore::new();
        let id: String = store.insert_asset(AssetKind::Image, b"aaa".to_vec(), Some("jpg"), None);
        let draft: String = store.insert_reference(&id).unwrap();

        let resolver = DedupResolver::new(&store, dir.path());
        let outcome: DedupOutcome = resolver
            .resolve(&LocalAsset::new("images/a.jpg", AssetKind::Image))
            .await
            .unwrap();

        match outcome {
            DedupOutcome::Existing(resolved) => {
                assert!(resolved.is_existing_asset);
                assert_eq!(resolved.asset_ids, vec![id, draft]);
                assert_eq!(resolved.original_filename, "images/a.jpg");
            }
            other => panic!("expected existing, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_lookup_is_scoped_by_kind() {
        let dir: TempDir = TempDir::new().unwrap();
        write_asset(&dir, "files/a.bin", b"same bytes");
        let store: MemoryAssetStore = MemoryAssetStore::new();
        store.insert_asset(AssetKind::Image, b"same bytes".to_vec(), None, None);

        let resolver = DedupResolver::new(&store, dir.path());
        let outcome: DedupOutcome = resolver
            .resolve(&LocalAsset::new("files/a.bin", AssetKind::File))
            .await
            .unwrap();

        assert!(matches!(outcome, DedupOutcome::NeedsUpload(_)));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir: TempDir = TempDir::new().unwrap();
        let store: MemoryAssetStore = MemoryAssetStore::new();

        let resolver = DedupResolver::new(&store, dir.path());
        let result = resolver
            .resolve(&LocalAsset::new("images/gone.jpg", AssetKind::Image))
            .await;

        assert!(matches!(result, Err(StorageError::IoError { .. })));
        assert_eq!(store.stats().queries, 0);
    }
}
