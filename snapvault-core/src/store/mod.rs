/*!
Data store boundary for snapshot, restore and purge operations.

The application's document database is an external collaborator. This module
defines the port the engine talks to and two adapters: an in-process store and a
directory of JSON collection files.
*/

pub mod json_dir;
pub mod memory;

use crate::{Document, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Access to the collections of the active data store
///
/// Implementations own their connection lifecycle; the engine only checks
/// [`DataStore::is_connected`] before it starts an operation. Every method acts on
/// a single collection so that operations stay independent per collection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Whether the connection is ready to serve requests
    fn is_connected(&self) -> bool;

    /// Names of every collection known to the store, in enumeration order
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Define a collection with no documents unless it already exists
    async fn ensure_collection(&self, collection: &str) -> Result<()>;

    /// Every document of a collection
    async fn find_all(&self, collection: &str) -> Result<Vec<Document>>;

    /// Remove every document of a collection, keeping the collection itself
    ///
    /// # Returns
    /// The number of documents removed
    async fn delete_all(&self, collection: &str) -> Result<u64>;

    /// Bulk insert documents into a collection
    ///
    /// # Returns
    /// The number of documents inserted
    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<u64>;
}

#[async_trait]
impl<T: DataStore + ?Sized> DataStore for Arc<T> {
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        (**self).list_collections().await
    }

    async fn ensure_collection(&self, collection: &str) -> Result<()> {
        (**self).ensure_collection(collection).await
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Document>> {
        (**self).find_all(collection).await
    }

    async fn delete_all(&self, collection: &str) -> Result<u64> {
        (**self).delete_all(collection).await
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<u64> {
        (**self).insert_many(collection, documents).await
    }
}

pub use json_dir::JsonDirDataStore;
pub use memory::MemoryDataStore;
