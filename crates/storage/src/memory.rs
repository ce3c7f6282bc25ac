//! In-memory [`AssetStore`] for tests and dry runs.
//!
//! Documents live in insertion order behind a mutex. A binary may be
//! referenced by several documents (a published asset and its
//! `drafts.` copy); only the primary document is listed for export.
//! Counters record every call so tests can assert on store traffic.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rusty_assets_common::{hash_bytes, AssetKind};

use crate::error::StorageError;
use crate::traits::AssetStore;
use crate::types::RemoteAsset;

/// Prefix of reference documents created by [`MemoryAssetStore::insert_reference`].
pub const DRAFT_PREFIX: &str = "drafts.";

/// Snapshot of store traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// `query_by_digest` calls.
    pub queries: u64,
    /// `upload` calls, including failed ones.
    pub upload_attempts: u64,
    /// Uploads that created a document.
    pub uploads: u64,
    /// Committed `patch_aspects` transactions.
    pub patch_transactions: u64,
    /// Documents modified by committed transactions.
    pub patched_documents: u64,
    /// Completed downloads.
    pub downloads: u64,
    /// Highest number of store calls in flight at once.
    pub max_in_flight: usize,
}

#[derive(Debug, Clone)]
struct Document<A> {
    id: String,
    kind: AssetKind,
    digest: String,
    extension: Option<String>,
    data: Arc<Vec<u8>>,
    aspects: Option<A>,
    is_reference: bool,
}

#[derive(Debug)]
struct State<A> {
    documents: Vec<Document<A>>,
    next_id: u64,
    upload_errors: HashMap<String, StorageError>,
    download_errors: HashMap<String, StorageError>,
}

#[derive(Debug, Default)]
struct Counters {
    queries: AtomicU64,
    upload_attempts: AtomicU64,
    uploads: AtomicU64,
    patch_transactions: AtomicU64,
    patched_documents: AtomicU64,
    downloads: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Tracks one in-flight call; decrements on drop.
struct InFlight<'a> {
    counters: &'a Counters,
}

impl<'a> InFlight<'a> {
    fn enter(counters: &'a Counters) -> Self {
        let now: usize = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self { counters }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Asset store held entirely in memory.
///
/// `A` is the aspects payload; it defaults to raw JSON.
#[derive(Debug)]
pub struct MemoryAssetStore<A = serde_json::Value> {
    state: Mutex<State<A>>,
    counters: Counters,
    latency: Option<Duration>,
}

impl<A> Default for MemoryAssetStore<A> {
    fn default() -> Self {
        Self {
            state: Mutex::new(State {
                documents: Vec::new(),
                next_id: 1,
                upload_errors: HashMap::new(),
                download_errors: HashMap::new(),
            }),
            counters: Counters::default(),
            latency: None,
        }
    }
}

impl<A: Clone> MemoryAssetStore<A> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every store call, so concurrent callers overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn lock(&self) -> MutexGuard<'_, State<A>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// Add an asset document directly.
    ///
    /// # Returns
    /// The new document ID.
    pub fn insert_asset(
        &self,
        kind: AssetKind,
        data: Vec<u8>,
        extension: Option<&str>,
        aspects: Option<A>,
    ) -> String {
        let mut state = self.lock();
        let id: String = format!("{}-{:04}", kind.as_str(), state.next_id);
        state.next_id += 1;
        state.documents.push(Document {
            id: id.clone(),
            kind,
            digest: hash_bytes(&data),
            extension: extension.map(|ext| ext.trim_start_matches('.').to_string()),
            data: Arc::new(data),
            aspects,
            is_reference: false,
        });
        id
    }

    /// Add a second document referencing the same binary as `document_id`.
    ///
    /// # Returns
    /// The reference's ID, or `None` if `document_id` does not exist.
    pub fn insert_reference(&self, document_id: &str) -> Option<String> {
        let mut state = self.lock();
        let source: Document<A> = state
            .documents
            .iter()
            .find(|doc| doc.id == document_id)?
            .clone();
        let id: String = format!("{}{}", DRAFT_PREFIX, source.id);
        state.documents.push(Document {
            id: id.clone(),
            is_reference: true,
            ..source
        });
        Some(id)
    }

    /// Make every upload of `original_filename` fail with `error`.
    pub fn inject_upload_error(&self, original_filename: &str, error: StorageError) {
        self.lock()
            .upload_errors
            .insert(original_filename.to_string(), error);
    }

    /// Make downloads of `document_id` write half the bytes, then fail.
    pub fn inject_download_error(&self, document_id: &str, error: StorageError) {
        self.lock()
            .download_errors
            .insert(document_id.to_string(), error);
    }

    /// Current aspects of a document.
    pub fn aspects_of(&self, document_id: &str) -> Option<A> {
        self.lock()
            .documents
            .iter()
            .find(|doc| doc.id == document_id)
            .and_then(|doc| doc.aspects.clone())
    }

    /// Number of documents, references included.
    pub fn document_count(&self) -> usize {
        self.lock().documents.len()
    }

    /// Snapshot of call counters.
    pub fn stats(&self) -> StoreStats {
        let c: &Counters = &self.counters;
        StoreStats {
            queries: c.queries.load(Ordering::SeqCst),
            upload_attempts: c.upload_attempts.load(Ordering::SeqCst),
            uploads: c.uploads.load(Ordering::SeqCst),
            patch_transactions: c.patch_transactions.load(Ordering::SeqCst),
            patched_documents: c.patched_documents.load(Ordering::SeqCst),
            downloads: c.downloads.load(Ordering::SeqCst),
            max_in_flight: c.max_in_flight.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl<A> AssetStore for MemoryAssetStore<A>
where
    A: Clone + Send + Sync + 'static,
{
    type Aspects = A;

    async fn query_by_digest(
        &self,
        kind: AssetKind,
        digest: &str,
    ) -> Result<Vec<String>, StorageError> {
        let _guard = InFlight::enter(&self.counters);
        self.counters.queries.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        let state = self.lock();
        Ok(state
            .documents
            .iter()
            .filter(|doc| doc.kind == kind && doc.digest == digest)
            .map(|doc| doc.id.clone())
            .collect())
    }

    async fn upload(
        &self,
        kind: AssetKind,
        file_path: &Path,
        original_filename: &str,
    ) -> Result<String, StorageError> {
        let _guard = InFlight::enter(&self.counters);
        self.counters.upload_attempts.fetch_add(1, Ordering::SeqCst);

        let data: Vec<u8> = tokio::fs::read(file_path)
            .await
            .map_err(|e| StorageError::from_io(file_path.display().to_string(), e))?;
        self.simulate_latency().await;

        let digest: String = hash_bytes(&data);
        let mut state = self.lock();
        if let Some(err) = state.upload_errors.get(original_filename) {
            return Err(err.clone());
        }
        if let Some(existing) = state
            .documents
            .iter()
            .find(|doc| doc.kind == kind && doc.digest == digest)
        {
            return Err(StorageError::Conflict {
                key: original_filename.to_string(),
                message: format!("asset with this content already exists as {}", existing.id),
            });
        }

        let id: String = format!("{}-{:04}", kind.as_str(), state.next_id);
        state.next_id += 1;
        let extension: Option<String> = Path::new(original_filename)
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned());
        state.documents.push(Document {
            id: id.clone(),
            kind,
            digest,
            extension,
            data: Arc::new(data),
            aspects: None,
            is_reference: false,
        });
        self.counters.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn patch_aspects(
        &self,
        document_ids: &[String],
        aspects: &A,
    ) -> Result<(), StorageError> {
        let _guard = InFlight::enter(&self.counters);
        self.simulate_latency().await;

        let mut state = self.lock();
        if let Some(missing) = document_ids
            .iter()
            .find(|id| !state.documents.iter().any(|doc| &doc.id == *id))
        {
            return Err(StorageError::NotFound {
                key: missing.clone(),
            });
        }

        for doc in state
            .documents
            .iter_mut()
            .filter(|doc| document_ids.contains(&doc.id))
        {
            doc.aspects = Some(aspects.clone());
        }
        self.counters.patch_transactions.fetch_add(1, Ordering::SeqCst);
        self.counters
            .patched_documents
            .fetch_add(document_ids.len() as u64, Ordering::SeqCst);
        Ok(())
    }

    async fn list_assets(&self, kind: AssetKind) -> Result<Vec<RemoteAsset<A>>, StorageError> {
        let _guard = InFlight::enter(&self.counters);
        self.simulate_latency().await;

        let state = self.lock();
        Ok(state
            .documents
            .iter()
            .filter(|doc| doc.kind == kind && !doc.is_reference)
            .map(|doc| RemoteAsset {
                document_id: doc.id.clone(),
                kind: doc.kind,
                extension: doc.extension.clone(),
                aspects: doc.aspects.clone(),
            })
            .collect())
    }

    async fn download(&self, document_id: &str, destination: &Path) -> Result<u64, StorageError> {
        let _guard = InFlight::enter(&self.counters);
        self.simulate_latency().await;

        let (data, failure): (Arc<Vec<u8>>, Option<StorageError>) = {
            let state = self.lock();
            let doc: &Document<A> = state
                .documents
                .iter()
                .find(|doc| doc.id == document_id)
                .ok_or_else(|| StorageError::NotFound {
                    key: document_id.to_string(),
                })?;
            (
                Arc::clone(&doc.data),
                state.download_errors.get(document_id).cloned(),
            )
        };

        let to_storage_error =
            |e: std::io::Error| StorageError::from_io(destination.display().to_string(), e);

        if let Some(err) = failure {
            tokio::fs::write(destination, &data[..data.len() / 2])
                .await
                .map_err(to_storage_error)?;
            return Err(err);
        }

        tokio::fs::write(destination, data.as_slice())
            .await
            .map_err(to_storage_error)?;
        self.counters.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(data.len() as u64)
    }
}
