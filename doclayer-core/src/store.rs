//! Main document store interface for interacting with document backends.
//!
//! [`DocumentStore`] wraps one backend and hands out [`Collection`] handles. A store
//! bound to a concrete backend type can be turned into a [`DynDocumentStore`] for
//! runtime backend selection.
//!
//! # Example
//!
//! ```ignore
//! use doclayer::store::DocumentStore;
//!
//! let store = DocumentStore::new(backend);
//! store.create_collection("users", Options::default()).await?;
//! let users = store.collection("users");
//! ```

use std::sync::Arc;

use crate::{
    TRACING_TARGET,
    backend::StoreBackend,
    collection::Collection,
    error::{DocumentStoreError, DocumentStoreResult},
    options::Options,
    tracker::{OperationGuard, OperationTracker},
};

/// A document store bound to a backend.
///
/// # Type Parameters
///
/// * `B` - The backend implementation type
#[derive(Debug)]
pub struct DocumentStore<B: StoreBackend> {
    backend: B,
    ops: Arc<OperationTracker>,
}

/// A document store over a boxed backend, chosen at runtime.
pub type DynDocumentStore = DocumentStore<Box<dyn StoreBackend>>;

impl<B: StoreBackend> DocumentStore<B> {
    /// Creates a new document store with the given backend.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            ops: OperationTracker::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Gets a handle to the collection with the given name.
    ///
    /// The collection is not checked for existence; operations on a missing collection
    /// fail with a not-found error from the backend.
    pub fn collection<'a>(&'a self, name: &str) -> Collection<'a, B> {
        Collection::new(name.to_string(), &self.backend, self.ops.clone())
    }

    fn start_operation(&self) -> DocumentStoreResult<OperationGuard> {
        self.ops
            .start()
            .ok_or(DocumentStoreError::ClientClosed)
    }

    /// Creates a new collection with the given name.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection already exists or creation fails.
    pub async fn create_collection(
        &self,
        name: &str,
        options: impl Into<Options>,
    ) -> DocumentStoreResult<()> {
        let _op = self.start_operation()?;

        self.backend
            .create_collection(name, &options.into())
            .await
    }

    /// Drops (deletes) a collection with the given name.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection does not exist or deletion fails.
    pub async fn drop_collection(
        &self,
        name: &str,
        options: impl Into<Options>,
    ) -> DocumentStoreResult<()> {
        let _op = self.start_operation()?;

        self.backend
            .drop_collection(name, &options.into())
            .await
    }

    /// Lists all collections in the store.
    pub async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        let _op = self.start_operation()?;

        self.backend.list_collections().await
    }

    /// Whether the backend has a collection called `name`.
    pub async fn collection_exists(&self, name: &str) -> DocumentStoreResult<bool> {
        let _op = self.start_operation()?;

        self.backend
            .collection_exists(name)
            .await
    }

    /// Closes the store and the backend.
    ///
    /// New operations on the store or any of its collections fail with
    /// [`DocumentStoreError::ClientClosed`]. Running operations and open cursors are
    /// waited for before the backend is closed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to close.
    pub async fn close(&self) -> DocumentStoreResult<()> {
        tracing::debug!(
            target: TRACING_TARGET,
            active = self.ops.active(),
            "Closing document store"
        );

        self.ops.close().await;
        self.backend.close().await
    }

    /// Whether [`DocumentStore::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.ops.is_closed()
    }
}

impl<B: StoreBackend + 'static> DocumentStore<B> {
    /// Converts this store into one that dispatches dynamically.
    pub fn into_dyn(self) -> DynDocumentStore {
        DocumentStore {
            backend: Box::new(self.backend),
            ops: self.ops,
        }
    }
}
