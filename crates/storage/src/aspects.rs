//! Aspect write policy.
//!
//! New assets always receive the sidecar's aspects. Assets that already
//! existed keep theirs unless replacement is requested, in which case every
//! document referencing the binary is patched in a single transaction.

use crate::error::StorageError;
use crate::traits::AssetStore;
use crate::types::{AspectSkip, AspectWrite, AssetWithAspects};

/// Applies sidecar aspects to resolved assets.
pub struct AspectWriter<'a, C: AssetStore> {
    /// The remote store.
    client: &'a C,
    /// Overwrite aspects on assets that already existed.
    replace_aspects: bool,
}

impl<'a, C: AssetStore> AspectWriter<'a, C> {
    /// Create a new aspect writer.
    ///
    /// # Arguments
    /// * `client` - Remote store
    /// * `replace_aspects` - Overwrite aspects on pre-existing assets
    pub fn new(client: &'a C, replace_aspects: bool) -> Self {
        Self {
            client,
            replace_aspects,
        }
    }

    /// Decide whether an asset needs an aspect write, and issue it.
    ///
    /// # Errors
    /// Returns the store error if the transaction fails. No document is
    /// modified in that case.
    pub async fn write(
        &self,
        item: &AssetWithAspects<C::Aspects>,
    ) -> Result<AspectWrite, StorageError> {
        let filename: &str = &item.asset.original_filename;

        if item.asset.is_existing_asset && !self.replace_aspects {
            log::debug!(
                "[Asset {}] Skipping aspects on existing asset (replacement disabled)",
                filename
            );
            return Ok(AspectWrite::Skipped(AspectSkip::PreservedExisting));
        }

        let Some(aspects) = item.aspects.as_ref() else {
            log::debug!("[Asset {}] No aspects in metadata", filename);
            return Ok(AspectWrite::Skipped(AspectSkip::NoAspects));
        };

        let document_ids: &[String] = &item.asset.asset_ids;
        log::debug!(
            "[Asset {}] Writing aspects to {} document(s)",
            filename,
            document_ids.len()
        );
        self.client.patch_aspects(document_ids, aspects).await?;

        Ok(AspectWrite::Written {
            documents: document_ids.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryAssetStore;
    use crate::types::ResolvedAsset;
    use rusty_assets_common::AssetKind;
    use serde_json::{json, Value};

    fn store_with_referenced_asset() -> (MemoryAssetStore, Vec<String>) {
        let store: MemoryAssetStore = MemoryAssetStore::new();
        let id: String = store.insert_asset(
            AssetKind::Image,
            b"aaa".to_vec(),
            Some("jpg"),
            Some(json!({"title": "old"})),
        );
        let draft: String = store.insert_reference(&id).unwrap();
        (store, vec![id, draft])
    }

    fn existing(ids: Vec<String>, aspects: Option<Value>) -> AssetWithAspects<Value> {
        AssetWithAspects {
            asset: ResolvedAsset::existing(ids, "images/a.jpg", "digest", AssetKind::Image),
            aspects,
        }
    }

    #[tokio::test]
    async fn test_existing_asset_preserved_without_replace() {
        let (store, ids) = store_with_referenced_asset();
        let writer = AspectWriter::new(&store, false);

        let result: AspectWrite = writer
            .write(&existing(ids.clone(), Some(json!({"title": "new"}))))
            .await
            .unwrap();

        assert_eq!(result, AspectWrite::Skipped(AspectSkip::PreservedExisting));
        assert_eq!(store.aspects_of(&ids[0]), Some(json!({"title": "old"})));
        assert_eq!(store.stats().patch_transactions, 0);
    }

    #[tokio::test]
    async fn test_replace_patches_every_reference_in_one_transaction() {
        let (store, ids) = store_with_referenced_asset();
        let writer = AspectWriter::new(&store, true);

        let result: AspectWrite = writer
            .write(&existing(ids.clone(), Some(json!({"title": "new"}))))
            .await
            .unwrap();

        assert_eq!(result, AspectWrite::Written { documents: 2 });
        assert_eq!(store.aspects_of(&ids[0]), Some(json!({"title": "new"})));
        assert_eq!(store.aspects_of(&ids[1]), Some(json!({"title": "new"})));
        assert_eq!(store.stats().patch_transactions, 1);
        assert_eq!(store.stats().patched_documents, 2);
    }

    #[tokio::test]
    async fn test_missing_aspects_issue_no_write() {
        let (store, ids) = store_with_referenced_asset();
        let writer = AspectWriter::new(&store, true);

        let result: AspectWrite = writer.write(&existing(ids, None)).await.unwrap();

        assert_eq!(result, AspectWrite::Skipped(AspectSkip::NoAspects));
        assert_eq!(store.stats().patch_transactions, 0);
    }

    #[tokio::test]
    async fn test_null_aspects_are_written() {
        let (store, ids) = store_with_referenced_asset();
        let writer = AspectWriter::new(&store, true);

        let result: AspectWrite = writer
            .write(&existing(ids.clone(), Some(Value::Null)))
            .await
            .unwrap();

        assert_eq!(result, AspectWrite::Written { documents: 2 });
        assert_eq!(store.aspects_of(&ids[0]), Some(Value::Null));
        assert_eq!(store.stats().patch_transactions, 1);
    }

    #[tokio::test]
    async fn test_new_asset_always_written() {
        let store: MemoryAssetStore = MemoryAssetStore::new();
        let id: String = store.insert_asset(AssetKind::File, b"x".to_vec(), None, None);
        let writer = AspectWriter::new(&store, false);

        let item: AssetWithAspects<Value> = AssetWithAspects {
            asset: ResolvedAsset::uploaded(id.clone(), "files/x.bin", "digest", AssetKind::File),
            aspects: Some(json!({})),
        };
        let result: AspectWrite = writer.write(&item).await.unwrap();

        assert_eq!(result, AspectWrite::Written { documents: 1 });
        assert_eq!(store.aspects_of(&id), Some(json!({})));
    }

    #[tokio::test]
    async fn test_failed_transaction_modifies_nothing() {
        let (store, mut ids) = store_with_referenced_asset();
        ids.push("missing".to_string());
        let writer = AspectWriter::new(&store, true);

        let result = writer
            .write(&existing(ids.clone(), Some(json!({"title": "new"}))))
            .await;

        assert!(matches!(result, Err(StorageError::NotFound { .. })));
        assert_eq!(store.aspects_of(&ids[0]), Some(json!({"title": "old"})));
        assert_eq!(store.aspects_of(&ids[1]), Some(json!({"title": "old"})));
    }
}
