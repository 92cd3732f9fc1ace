/*!
Main snapshot engine that orchestrates export, restore and purge operations.

This module contains the core business logic for whole-store backups,
orchestrating the data store and the artifact store. None of the operations are
transactional: collections are read, replaced and emptied one at a time, and a
failure part way through leaves earlier collections already processed.
*/

use crate::artifact::{artifact_file_name, ArtifactInfo, ArtifactStore};
use crate::config::{create_artifact_store, ArtifactConfig};
use crate::document::validate_collection_name;
use crate::{DataStore, Result, SnapshotBody, SnapvaultError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

/// How many later timestamps to try when a derived artifact name is already taken
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Outcome of a successful export
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportReceipt {
    /// Artifact file name (`backup-<timestamp>.json`)
    pub file_name: String,
    /// Where the artifact was written (absolute path for local storage)
    pub location: String,
    pub created_at: DateTime<Utc>,
    pub collections: usize,
    pub documents: usize,
    pub size_bytes: usize,
    /// Hex SHA-256 of the artifact bytes
    pub sha256: String,
}

/// Per-collection result of a restore
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionRestore {
    pub collection: String,
    pub deleted: u64,
    pub inserted: u64,
}

/// Outcome of a successful restore
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub collections: Vec<CollectionRestore>,
}

impl RestoreReport {
    pub fn documents_inserted(&self) -> u64 {
        self.collections.iter().map(|c| c.inserted).sum()
    }

    pub fn documents_deleted(&self) -> u64 {
        self.collections.iter().map(|c| c.deleted).sum()
    }
}

/// Outcome of a successful purge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub collections: usize,
    pub deleted: u64,
}

/// Anything that can produce a snapshot artifact on demand
///
/// The scheduler only depends on this trait, so it can drive any engine
/// regardless of its data store and artifact store types.
#[async_trait]
pub trait SnapshotExporter: Send + Sync {
    async fn export_snapshot(&self) -> Result<ExportReceipt>;
}

/// Main engine for export, restore and purge operations
///
/// The engine applies no locking across operations: an export racing a restore
/// or purge may capture a mix of old and new collection contents.
///
/// # Example
/// ```rust
/// use snapvault_core::{MemoryArtifactStore, MemoryDataStore, SnapshotEngine};
///
/// # tokio_test_block_on(async {
/// let store = MemoryDataStore::with_collections(["users", "orders"]);
/// let engine = SnapshotEngine::new(store, MemoryArtifactStore::new());
///
/// let receipt = engine.export_snapshot().await?;
/// assert!(receipt.file_name.starts_with("backup-"));
/// assert_eq!(receipt.collections, 2);
/// # Ok::<(), snapvault_core::SnapvaultError>(())
/// # }).unwrap();
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
pub struct SnapshotEngine<D, A>
where
    D: DataStore,
    A: ArtifactStore,
{
    store: D,
    artifacts: A,
    last_export_at: Mutex<Option<DateTime<Utc>>>,
}

impl<D, A> SnapshotEngine<D, A>
where
    D: DataStore,
    A: ArtifactStore,
{
    /// Create a new engine over a data store and an artifact store
    pub fn new(store: D, artifacts: A) -> Self {
        Self {
            store,
            artifacts,
            last_export_at: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &D {
        &self.store
    }

    pub fn artifacts(&self) -> &A {
        &self.artifacts
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.store.is_connected() {
            Ok(())
        } else {
            Err(SnapvaultError::connection("data store is not connected"))
        }
    }

    /// Read every collection of the data store without writing an artifact
    ///
    /// Collections are read one after another in the store's enumeration order;
    /// every collection appears in the result, empty ones included.
    pub async fn collect_snapshot(&self) -> Result<SnapshotBody> {
        self.ensure_connected()?;

        let mut body = SnapshotBody::new();
        for collection in self.store.list_collections().await? {
            let documents = self.store.find_all(&collection).await?;
            debug!(collection = %collection, documents = documents.len(), "Read collection");
            body.insert(collection, documents);
        }
        Ok(body)
    }

    /// Export the whole data store to a new artifact
    ///
    /// This method:
    /// 1. Checks the data store connection (nothing is written if it is down)
    /// 2. Reads every collection in enumeration order
    /// 3. Serializes the collection-to-documents mapping as JSON
    /// 4. Writes it as `backup-<timestamp>.json`
    ///
    /// # Errors
    /// * `SnapvaultError::Connection` - If the data store is not connected
    /// * `SnapvaultError::Store` - If reading a collection fails
    /// * `SnapvaultError::Io` - If writing the artifact fails
    pub async fn export_snapshot(&self) -> Result<ExportReceipt> {
        #[cfg(feature = "metrics")]
        let timer = crate::observability::ExportTimer::start();

        let result = self.export_snapshot_inner().await;

        #[cfg(feature = "metrics")]
        match &result {
            Ok(receipt) => timer.finish(receipt.size_bytes),
            Err(_) => timer.finish_with_error(),
        }

        result
    }

    async fn export_snapshot_inner(&self) -> Result<ExportReceipt> {
        let body = self.collect_snapshot().await?;
        let bytes = body.to_vec_pretty()?;

        self.artifacts.ensure_ready()?;
        let (created_at, file_name) = self.next_artifact_name()?;
        self.artifacts.write(&file_name, &bytes)?;

        let receipt = ExportReceipt {
            location: self.artifacts.location(&file_name),
            file_name,
            created_at,
            collections: body.len(),
            documents: body.document_count(),
            size_bytes: bytes.len(),
            sha256: format!("{:x}", Sha256::digest(&bytes)),
        };

        info!(
            file_name = %receipt.file_name,
            collections = receipt.collections,
            documents = receipt.documents,
            size = receipt.size_bytes,
            "Snapshot exported"
        );
        Ok(receipt)
    }

    /// Pick a timestamp-derived name that no earlier export of this engine used
    /// and that is not present in the artifact store
    fn next_artifact_name(&self) -> Result<(DateTime<Utc>, String)> {
        let mut last = self
            .last_export_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut at = Utc::now().trunc_subsecs(3);
        if let Some(previous) = *last {
            if at <= previous {
                at = previous + Duration::milliseconds(1);
            }
        }

        for _ in 0..MAX_NAME_ATTEMPTS {
            let name = artifact_file_name(at);
            if !self.artifacts.exists(&name) {
                *last = Some(at);
                return Ok((at, name));
            }
            at += Duration::milliseconds(1);
        }

        Err(SnapvaultError::storage(
            "could not derive an unused artifact name",
        ))
    }

    /// Replace collection contents from a snapshot payload
    ///
    /// For each collection in payload order: the collection is defined if it is
    /// missing, every existing document is deleted, then the payload's documents
    /// are inserted (the insert is skipped for an empty list). Collections the
    /// payload does not name are left untouched.
    ///
    /// # Errors
    /// * `SnapvaultError::Connection` - If the data store is not connected; nothing
    ///   has been modified
    /// * `SnapvaultError::Validation` - If any collection name is invalid; nothing
    ///   has been modified
    /// * `SnapvaultError::Store` - If a delete or insert fails; collections before
    ///   the failing one have already been replaced
    pub async fn restore_snapshot(&self, payload: SnapshotBody) -> Result<RestoreReport> {
        self.ensure_connected()?;
        for collection in payload.collection_names() {
            validate_collection_name(collection)?;
        }

        let mut report = RestoreReport::default();
        for (collection, documents) in payload.into_collections() {
            match self.replace_collection(&collection, documents).await {
                Ok(restored) => report.collections.push(restored),
                Err(e) => {
                    warn!(
                        collection = %collection,
                        restored = report.collections.len(),
                        error = %e,
                        "Restore aborted, earlier collections were already replaced"
                    );
                    return Err(e);
                }
            }
        }

        #[cfg(feature = "metrics")]
        crate::observability::with_metrics(|m| m.restores_total.inc());

        info!(
            collections = report.collections.len(),
            documents = report.documents_inserted(),
            "Snapshot restored"
        );
        Ok(report)
    }

    async fn replace_collection(
        &self,
        collection: &str,
        documents: Vec<crate::Document>,
    ) -> Result<CollectionRestore> {
        self.store.ensure_collection(collection).await?;
        let deleted = self.store.delete_all(collection).await?;
        let inserted = if documents.is_empty() {
            0
        } else {
            self.store.insert_many(collection, documents).await?
        };

        debug!(collection = %collection, deleted, inserted, "Replaced collection");
        Ok(CollectionRestore {
            collection: collection.to_string(),
            deleted,
            inserted,
        })
    }

    /// Restore from an untyped JSON payload such as a request body
    ///
    /// The payload is fully validated before any collection is touched.
    pub async fn restore_from_value(&self, payload: serde_json::Value) -> Result<RestoreReport> {
        let body = SnapshotBody::from_value(payload)?;
        self.restore_snapshot(body).await
    }

    /// Restore from raw JSON bytes, e.g. an uploaded artifact file
    pub async fn restore_from_bytes(&self, bytes: &[u8]) -> Result<RestoreReport> {
        let body = SnapshotBody::from_slice(bytes)?;
        self.restore_snapshot(body).await
    }

    /// Restore from an artifact held in the artifact store
    pub async fn restore_artifact(&self, name: &str) -> Result<RestoreReport> {
        let bytes = self.artifacts.read(name)?;
        info!(file_name = %name, "Restoring from artifact");
        self.restore_from_bytes(&bytes).await
    }

    /// Delete every document of every collection, keeping the collections
    ///
    /// There is no confirmation step here; callers that need one must ask before
    /// invoking this. Purging an empty store is a no-op.
    ///
    /// # Errors
    /// * `SnapvaultError::Connection` - If the data store is not connected; nothing
    ///   has been deleted
    /// * `SnapvaultError::Store` - If a delete fails; earlier collections are
    ///   already empty
    pub async fn purge_all(&self) -> Result<PurgeReport> {
        self.ensure_connected()?;

        let mut report = PurgeReport::default();
        for collection in self.store.list_collections().await? {
            let deleted = self.store.delete_all(&collection).await.map_err(|e| {
                warn!(
                    collection = %collection,
                    purged = report.collections,
                    error = %e,
                    "Purge aborted, earlier collections were already emptied"
                );
                e
            })?;
            debug!(collection = %collection, deleted, "Emptied collection");
            report.collections += 1;
            report.deleted += deleted;
        }

        #[cfg(feature = "metrics")]
        crate::observability::with_metrics(|m| m.purges_total.inc());

        info!(
            collections = report.collections,
            deleted = report.deleted,
            "All collections purged"
        );
        Ok(report)
    }

    /// Every stored artifact, newest first
    pub fn list_artifacts(&self) -> Result<Vec<ArtifactInfo>> {
        self.artifacts.list()
    }

    /// Raw bytes of a stored artifact
    pub fn read_artifact(&self, name: &str) -> Result<Vec<u8>> {
        self.artifacts.read(name)
    }
}

#[async_trait]
impl<D, A> SnapshotExporter for SnapshotEngine<D, A>
where
    D: DataStore,
    A: ArtifactStore,
{
    async fn export_snapshot(&self) -> Result<ExportReceipt> {
        SnapshotEngine::export_snapshot(self).await
    }
}

/// Create an engine whose artifact store is selected by configuration
///
/// # Example
/// ```rust
/// use snapvault_core::{create_engine_from_config, ArtifactConfig, MemoryDataStore};
///
/// let engine = create_engine_from_config(MemoryDataStore::new(), &ArtifactConfig::memory())?;
/// assert!(engine.list_artifacts()?.is_empty());
/// # Ok::<(), snapvault_core::SnapvaultError>(())
/// ```
pub fn create_engine_from_config<D: DataStore>(
    store: D,
    config: &ArtifactConfig,
) -> Result<SnapshotEngine<D, Box<dyn ArtifactStore>>> {
    let artifacts = create_artifact_store(config)?;
    Ok(SnapshotEngine::new(store, artifacts))
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
