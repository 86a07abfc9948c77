//! Collection handles for document store operations.
//!
//! A [`Collection`] is obtained from a [`DocumentStore`](crate::store::DocumentStore)
//! and scopes every operation to one named collection of the backend. Multi-row
//! operations return cursors: [`BulkResults`](crate::bulk::BulkResults) from
//! `bulk_docs`, [`Rows`] from `all_docs` and `find`, [`Changes`] from `changes`.
//!
//! # Example
//!
//! ```ignore
//! use bson::doc;
//! use doclayer::prelude::*;
//!
//! let users = store.collection("users");
//! let rev = users.put("alice", doc! { "name": "Alice" }, Options::default()).await?;
//! let alice = users.get("alice", Options::default()).await?;
//! users.delete("alice", &rev, Options::default()).await?;
//! ```

use std::sync::Arc;

use bson::Document;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::{
    TRACING_TARGET,
    backend::{Security, StoreBackend},
    changes::Changes,
    document::{DocumentInput, from_document},
    error::{Capability, DocumentStoreError, DocumentStoreResult},
    iter::{Cursor, ReleaseFn},
    options::Options,
    rows::Rows,
    tracker::{OperationGuard, OperationTracker},
};

/// A handle to one collection of a backend.
///
/// # Type Parameters
///
/// * `'a` - Lifetime of the backend reference
/// * `B` - The storage backend type, possibly `dyn StoreBackend`
#[derive(Debug)]
pub struct Collection<'a, B: StoreBackend + ?Sized> {
    name: String,
    backend: &'a B,
    store_ops: Arc<OperationTracker>,
    ops: Arc<OperationTracker>,
}

/// Keeps both the store and the collection marked busy for one operation.
#[derive(Debug)]
pub(crate) struct ActiveOperation {
    _store: OperationGuard,
    _collection: OperationGuard,
}

impl ActiveOperation {
    /// Turns the operation into a cursor release callback that ends it.
    pub(crate) fn into_release(self) -> ReleaseFn {
        Box::new(move || drop(self))
    }
}

impl<'a, B: StoreBackend + ?Sized> Collection<'a, B> {
    pub(crate) fn new(name: String, backend: &'a B, store_ops: Arc<OperationTracker>) -> Self {
        Self {
            name,
            backend,
            store_ops,
            ops: OperationTracker::new(),
        }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn backend(&self) -> &'a B {
        self.backend
    }

    /// Returns the number of operations and open cursors running against this handle.
    pub fn active_operations(&self) -> usize {
        self.ops.active()
    }

    /// Marks an operation as started.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::ClientClosed`] or [`DocumentStoreError::DatabaseClosed`]
    /// if the store or this handle has been closed.
    pub(crate) fn start_operation(&self) -> DocumentStoreResult<ActiveOperation> {
        let store = self
            .store_ops
            .start()
            .ok_or(DocumentStoreError::ClientClosed)?;
        let collection = self
            .ops
            .start()
            .ok_or(DocumentStoreError::DatabaseClosed)?;

        Ok(ActiveOperation {
            _store: store,
            _collection: collection,
        })
    }

    /// Creates or updates the document stored under `id`.
    ///
    /// Updating requires the current revision, in the document's `_rev` field or as the
    /// [`rev`](crate::options::rev) option.
    ///
    /// # Returns
    ///
    /// The new revision.
    ///
    /// # Errors
    ///
    /// Returns a bad-request error if `id` is empty or the document cannot be
    /// normalized, and a conflict if the revision is stale.
    pub async fn put(
        &self,
        id: &str,
        document: impl Into<DocumentInput>,
        options: impl Into<Options>,
    ) -> DocumentStoreResult<String> {
        let document = document.into().normalize()?;
        self.put_document(id, document, &options.into())
            .await
    }

    pub(crate) async fn put_document(
        &self,
        id: &str,
        document: Document,
        options: &Options,
    ) -> DocumentStoreResult<String> {
        if id.is_empty() {
            return Err(DocumentStoreError::BadRequest(
                "document id must not be empty".into(),
            ));
        }

        let _op = self.start_operation()?;

        tracing::trace!(
            target: TRACING_TARGET,
            collection = %self.name,
            id = %id,
            "Putting document"
        );

        self.backend
            .put(&self.name, id, document, options)
            .await
    }

    /// Creates a document under a backend generated identifier.
    ///
    /// # Returns
    ///
    /// The generated identifier and the new revision.
    pub async fn create_doc(
        &self,
        document: impl Into<DocumentInput>,
        options: impl Into<Options>,
    ) -> DocumentStoreResult<(String, String)> {
        let document = document.into().normalize()?;
        self.create_document(document, &options.into())
            .await
    }

    pub(crate) async fn create_document(
        &self,
        document: Document,
        options: &Options,
    ) -> DocumentStoreResult<(String, String)> {
        let _op = self.start_operation()?;

        self.backend
            .create_doc(&self.name, document, options)
            .await
    }

    /// Fetches a document, including its `_id` and `_rev` fields.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if the document does not exist or was deleted.
    pub async fn get(&self, id: &str, options: impl Into<Options>) -> DocumentStoreResult<Document> {
        let _op = self.start_operation()?;

        self.backend
            .get(&self.name, id, &options.into())
            .await
    }

    /// Fetches a document and decodes it into `T`.
    pub async fn get_as<T: DeserializeOwned>(
        &self,
        id: &str,
        options: impl Into<Options>,
    ) -> DocumentStoreResult<T> {
        from_document(self.get(id, options).await?)
    }

    /// Deletes the document at revision `rev`.
    ///
    /// # Returns
    ///
    /// The revision of the deletion tombstone.
    pub async fn delete(
        &self,
        id: &str,
        rev: &str,
        options: impl Into<Options>,
    ) -> DocumentStoreResult<String> {
        let _op = self.start_operation()?;

        self.backend
            .delete(&self.name, id, rev, &options.into())
            .await
    }

    /// Lists the live documents of the collection.
    ///
    /// Pass [`include_docs`](crate::options::include_docs) to populate [`Rows::doc`].
    pub async fn all_docs(
        &self,
        cancel: &CancellationToken,
        options: impl Into<Options>,
    ) -> DocumentStoreResult<Rows> {
        let op = self.start_operation()?;

        let producer = self
            .backend
            .all_docs(&self.name, &options.into())
            .await?;

        Ok(Rows::new(Cursor::new(cancel, producer, Some(op.into_release()))))
    }

    /// Runs a selector query.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::NotImplemented`] if the backend cannot run queries.
    pub async fn find(
        &self,
        cancel: &CancellationToken,
        selector: Document,
        options: impl Into<Options>,
    ) -> DocumentStoreResult<Rows> {
        let op = self.start_operation()?;

        let finder = self
            .backend
            .finder()
            .ok_or(DocumentStoreError::NotImplemented(Capability::Find))?;
        let producer = finder
            .find(&self.name, selector, &options.into())
            .await?;

        Ok(Rows::new(Cursor::new(cancel, producer, Some(op.into_release()))))
    }

    /// Streams the changes recorded for the collection.
    ///
    /// Supported options depend on the backend; `since` and `include_docs` are common.
    pub async fn changes(
        &self,
        cancel: &CancellationToken,
        options: impl Into<Options>,
    ) -> DocumentStoreResult<Changes> {
        let op = self.start_operation()?;

        let producer = self
            .backend
            .changes(&self.name, &options.into())
            .await?;

        Ok(Changes::new(Cursor::new(cancel, producer, Some(op.into_release()))))
    }

    /// Returns the collection's security object.
    pub async fn security(&self) -> DocumentStoreResult<Security> {
        let _op = self.start_operation()?;

        self.backend
            .securer()
            .ok_or(DocumentStoreError::NotImplemented(Capability::Security))?
            .security(&self.name)
            .await
    }

    /// Replaces the collection's security object.
    pub async fn set_security(&self, security: &Security) -> DocumentStoreResult<()> {
        let _op = self.start_operation()?;

        self.backend
            .securer()
            .ok_or(DocumentStoreError::NotImplemented(Capability::Security))?
            .set_security(&self.name, security)
            .await
    }

    /// Closes this handle.
    ///
    /// New operations fail with [`DocumentStoreError::DatabaseClosed`]. The call waits
    /// for running operations, including cursors that are still open, to finish.
    pub async fn close(&self) {
        tracing::debug!(
            target: TRACING_TARGET,
            collection = %self.name,
            active = self.ops.active(),
            "Closing collection"
        );

        self.ops.close().await;
    }

    /// Whether [`Collection::close`] has been called on this handle.
    pub fn is_closed(&self) -> bool {
        self.ops.is_closed()
    }
}
