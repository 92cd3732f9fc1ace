/*!
In-process data store adapter.
*/

use super::DataStore;
use crate::{Document, Result, SnapvaultError};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug)]
struct MemoryState {
    connected: bool,
    collections: Vec<(String, Vec<Document>)>,
}

/// Memory-based data store
///
/// Collections keep their creation order, which is also the enumeration order
/// reported by [`DataStore::list_collections`]. Clones share the same state, so a
/// test can hand one clone to the engine and inspect another.
///
/// # Example
/// ```rust
/// use snapvault_core::store::MemoryDataStore;
///
/// let store = MemoryDataStore::with_collections(["users", "orders"]);
/// assert_eq!(store.collection_names(), vec!["users", "orders"]);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryDataStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDataStore {
    /// Create a connected store with no collections
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                connected: true,
                collections: Vec::new(),
            })),
        }
    }

    /// Create a connected store with empty collections
    pub fn with_collections<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        for name in names {
            store.create_collection(name);
        }
        store
    }

    /// Define a collection if it does not exist yet
    pub fn create_collection<S: Into<String>>(&self, name: S) {
        let name = name.into();
        let mut state = self.lock();
        if !state.collections.iter().any(|(existing, _)| *existing == name) {
            state.collections.push((name, Vec::new()));
        }
    }

    /// Append documents to a collection, creating it when missing
    pub fn seed<S: Into<String>>(&self, name: S, documents: Vec<Document>) {
        let mut state = self.lock();
        push_documents(&mut state, name.into(), documents);
    }

    /// Current documents of a collection (empty when the collection is unknown)
    pub fn documents(&self, name: &str) -> Vec<Document> {
        self.lock()
            .collections
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, documents)| documents.clone())
            .unwrap_or_default()
    }

    /// Names of all defined collections
    pub fn collection_names(&self) -> Vec<String> {
        self.lock()
            .collections
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Simulate a dropped connection
    pub fn disconnect(&self) {
        self.lock().connected = false;
    }

    pub fn reconnect(&self) {
        self.lock().connected = true;
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_connected(state: &MemoryState) -> Result<()> {
        if state.connected {
            Ok(())
        } else {
            Err(SnapvaultError::connection("in-memory data store is disconnected"))
        }
    }
}

impl Default for MemoryDataStore {
    fn default() -> Self {
        Self::new()
    }
}

fn push_documents(state: &mut MemoryState, name: String, documents: Vec<Document>) {
    match state.collections.iter_mut().find(|(existing, _)| *existing == name) {
        Some((_, existing)) => existing.extend(documents),
        None => state.collections.push((name, documents)),
    }
}

#[async_trait]
impl DataStore for MemoryDataStore {
    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let state = self.lock();
        Self::ensure_connected(&state)?;
        Ok(state.collections.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn ensure_collection(&self, collection: &str) -> Result<()> {
        let mut state = self.lock();
        Self::ensure_connected(&state)?;
        push_documents(&mut state, collection.to_string(), Vec::new());
        Ok(())
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Document>> {
        let state = self.lock();
        Self::ensure_connected(&state)?;
        Ok(state
            .collections
            .iter()
            .find(|(name, _)| name == collection)
            .map(|(_, documents)| documents.clone())
            .unwrap_or_default())
    }

    async fn delete_all(&self, collection: &str) -> Result<u64> {
        let mut state = self.lock();
        Self::ensure_connected(&state)?;
        let removed = state
            .collections
            .iter_mut()
            .find(|(name, _)| name == collection)
            .map(|(_, documents)| documents.drain(..).count())
            .unwrap_or(0);
        Ok(removed as u64)
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<u64> {
        let mut state = self.lock();
        Self::ensure_connected(&state)?;
        let inserted = documents.len() as u64;
        push_documents(&mut state, collection.to_string(), documents);
        Ok(inserted)
    }
}
