/*!
Directory-of-JSON-files data store adapter.
*/

use super::DataStore;
use crate::document::validate_collection_name;
use crate::{Document, Result, SnapvaultError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

const COLLECTION_EXTENSION: &str = "json";

/// Data store that keeps each collection as a JSON array in `<dir>/<collection>.json`
///
/// The collection set is the set of `.json` files in the directory, enumerated in
/// name order. Emptying a collection rewrites its file as `[]` so that the
/// collection stays defined. Writes go through a temporary file and a rename.
#[derive(Debug, Clone)]
pub struct JsonDirDataStore {
    root: PathBuf,
}

impl JsonDirDataStore {
    /// Open a store rooted at an existing directory
    ///
    /// The directory is not created here: a missing root reports the store as
    /// disconnected.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Directory holding the collection files
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Define an empty collection unless it already exists
    pub async fn create_collection(&self, name: &str) -> Result<()> {
        let path = self.collection_path(name)?;
        if fs::try_exists(&path).await? {
            return Ok(());
        }
        self.write_collection(&path, &[]).await
    }

    fn collection_path(&self, name: &str) -> Result<PathBuf> {
        validate_collection_name(name)?;
        Ok(self.root.join(format!("{name}.{COLLECTION_EXTENSION}")))
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(SnapvaultError::connection(format!(
                "data directory {} is not available",
                self.root.display()
            )))
        }
    }

    async fn read_collection(&self, path: &Path) -> Result<Vec<Document>> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(SnapvaultError::store(format!(
                    "Failed to read collection {}: {e}",
                    path.display()
                )))
            }
        };

        serde_json::from_slice(&bytes).map_err(|e| {
            SnapvaultError::store(format!(
                "Collection file {} is not an array of documents: {e}",
                path.display()
            ))
        })
    }

    async fn write_collection(&self, path: &Path, documents: &[Document]) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(documents)?;
        let tmp_path = path.with_extension("json.tmp");

        fs::write(&tmp_path, &bytes).await.map_err(|e| {
            SnapvaultError::store(format!("Failed to write {}: {e}", tmp_path.display()))
        })?;
        fs::rename(&tmp_path, path).await.map_err(|e| {
            SnapvaultError::store(format!("Failed to replace {}: {e}", path.display()))
        })?;

        Ok(())
    }
}

#[async_trait]
impl DataStore for JsonDirDataStore {
    fn is_connected(&self) -> bool {
        self.root.is_dir()
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        self.ensure_connected()?;

        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(COLLECTION_EXTENSION) {
                continue;
            }
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                names.push(stem.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    async fn ensure_collection(&self, collection: &str) -> Result<()> {
        self.ensure_connected()?;
        self.create_collection(collection).await
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Document>> {
        self.ensure_connected()?;
        let path = self.collection_path(collection)?;
        self.read_collection(&path).await
    }

    async fn delete_all(&self, collection: &str) -> Result<u64> {
        self.ensure_connected()?;
        let path = self.collection_path(collection)?;

        if !fs::try_exists(&path).await? {
            return Ok(0);
        }

        let removed = self.read_collection(&path).await?.len() as u64;
        self.write_collection(&path, &[]).await?;
        debug!(collection, removed, "emptied collection file");
        Ok(removed)
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<u64> {
        self.ensure_connected()?;
        let path = self.collection_path(collection)?;

        let inserted = documents.len() as u64;
        let mut existing = self.read_collection(&path).await?;
        existing.extend(documents);
        self.write_collection(&path, &existing).await?;
        Ok(inserted)
    }
}
