//! Storage backend abstraction for the document store.
//!
//! This module defines the contract a backend has to satisfy to be pluggable behind a
//! [`DocumentStore`](crate::store::DocumentStore).
//!
//! # Overview
//!
//! [`StoreBackend`] is the required surface: collection management, single document
//! CRUD, and the row producing operations every backend can answer (`all_docs`,
//! `changes`). Optional capabilities live in their own traits and are discovered at
//! runtime through the capability accessors on [`StoreBackend`]:
//!
//! - [`BulkDocer`]: native multi-document writes. When absent the store emulates bulk
//!   writes with one `put`/`create_doc` per document.
//! - [`Finder`]: selector based queries.
//! - [`SecurityBackend`]: per-collection security objects.
//!
//! Every multi-row operation hands back a [`ResultProducer`], a pull based source that
//! the store wraps in a [`Cursor`](crate::iter::Cursor).

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    options::Options,
};

/// A pull based source of items backing a cursor.
///
/// `next` returns `Ok(Some(item))` while items remain, `Ok(None)` once the source is
/// exhausted, and `Err` on failure. A producer is owned by exactly one cursor.
#[async_trait]
pub trait ResultProducer<T: Send + 'static>: Send {
    async fn next(&mut self) -> DocumentStoreResult<Option<T>>;

    /// Releases whatever the producer holds. Called at most once, by the owning cursor.
    async fn close(&mut self) -> DocumentStoreResult<()> {
        Ok(())
    }
}

pub type BoxProducer<T> = Box<dyn ResultProducer<T>>;

/// The outcome of writing one document in a bulk operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkResult {
    pub id: String,
    /// The new revision, empty when the write failed.
    pub rev: String,
    pub error: Option<DocumentStoreError>,
}

impl BulkResult {
    pub fn ok(id: impl Into<String>, rev: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rev: rev.into(),
            error: None,
        }
    }

    pub fn failed(id: impl Into<String>, error: DocumentStoreError) -> Self {
        Self {
            id: id.into(),
            rev: String::new(),
            error: Some(error),
        }
    }
}

/// A row of a row set (`all_docs`, `find`).
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub id: String,
    pub key: Bson,
    pub value: Bson,
    /// The full document, when the backend was asked to include it.
    pub doc: Option<Document>,
}

impl Default for Row {
    fn default() -> Self {
        Self {
            id: String::new(),
            key: Bson::Null,
            value: Bson::Null,
            doc: None,
        }
    }
}

/// One entry of a changes feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Change {
    pub id: String,
    pub seq: String,
    pub deleted: bool,
    /// Leaf revisions of the changed document.
    pub changes: Vec<String>,
    pub doc: Option<Document>,
}

/// Names and roles granted one level of access to a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Members {
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// A collection's security object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Security {
    #[serde(default)]
    pub admins: Members,
    #[serde(default)]
    pub members: Members,
}

/// Abstract interface for document storage backends.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and support concurrent access from multiple
/// async tasks.
///
/// # Optional capabilities
///
/// The `bulk_docer`, `finder` and `securer` accessors return `None` by default. A backend
/// advertising a capability returns `Some(self)` from the matching accessor.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Creates an empty collection.
    async fn create_collection(&self, name: &str, options: &Options) -> DocumentStoreResult<()>;

    /// Drops a collection and every document in it.
    async fn drop_collection(&self, name: &str, options: &Options) -> DocumentStoreResult<()>;

    /// Lists the names of all collections.
    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>>;

    async fn collection_exists(&self, name: &str) -> DocumentStoreResult<bool>;

    /// Creates or updates the document stored under `id`, returning the new revision.
    ///
    /// Updating an existing document requires the current revision, either in the
    /// document's `_rev` field or as the `rev` option.
    async fn put(
        &self,
        collection: &str,
        id: &str,
        document: Document,
        options: &Options,
    ) -> DocumentStoreResult<String>;

    /// Creates a document under a backend generated identifier, returning `(id, rev)`.
    async fn create_doc(
        &self,
        collection: &str,
        document: Document,
        options: &Options,
    ) -> DocumentStoreResult<(String, String)>;

    /// Fetches a document, including its `_id` and `_rev` fields.
    async fn get(&self, collection: &str, id: &str, options: &Options)
    -> DocumentStoreResult<Document>;

    /// Deletes the document at revision `rev`, returning the tombstone revision.
    async fn delete(
        &self,
        collection: &str,
        id: &str,
        rev: &str,
        options: &Options,
    ) -> DocumentStoreResult<String>;

    /// Lists the live documents of a collection ordered by identifier.
    async fn all_docs(&self, collection: &str, options: &Options)
    -> DocumentStoreResult<BoxProducer<Row>>;

    /// Streams the changes recorded for a collection.
    async fn changes(
        &self,
        collection: &str,
        options: &Options,
    ) -> DocumentStoreResult<BoxProducer<Change>>;

    /// Returns the native bulk write capability, if supported.
    fn bulk_docer(&self) -> Option<&dyn BulkDocer> {
        None
    }

    /// Returns the selector query capability, if supported.
    fn finder(&self) -> Option<&dyn Finder> {
        None
    }

    /// Returns the security object capability, if supported.
    fn securer(&self) -> Option<&dyn SecurityBackend> {
        None
    }

    /// Releases backend resources. The default implementation is a no-op.
    async fn close(&self) -> DocumentStoreResult<()> {
        Ok(())
    }
}

/// Native multi-document writes.
#[async_trait]
pub trait BulkDocer: Send + Sync {
    /// Writes every document and returns one result per document, in order.
    async fn bulk_docs(
        &self,
        collection: &str,
        documents: Vec<Document>,
        options: &Options,
    ) -> DocumentStoreResult<BoxProducer<BulkResult>>;
}

/// Selector based queries.
#[async_trait]
pub trait Finder: Send + Sync {
    async fn find(
        &self,
        collection: &str,
        selector: Document,
        options: &Options,
    ) -> DocumentStoreResult<BoxProducer<Row>>;
}

/// Per-collection security objects.
#[async_trait]
pub trait SecurityBackend: Send + Sync {
    async fn security(&self, collection: &str) -> DocumentStoreResult<Security>;

    async fn set_security(&self, collection: &str, security: &Security) -> DocumentStoreResult<()>;
}

macro_rules! forward_store_backend {
    ($($wrapper:ident),*) => {$(
        #[async_trait]
        impl<B: StoreBackend + ?Sized> StoreBackend for $wrapper<B> {
            async fn create_collection(&self, name: &str, options: &Options) -> DocumentStoreResult<()> {
                (**self).create_collection(name, options).await
            }

            async fn drop_collection(&self, name: &str, options: &Options) -> DocumentStoreResult<()> {
                (**self).drop_collection(name, options).await
            }

            async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
                (**self).list_collections().await
            }

            async fn collection_exists(&self, name: &str) -> DocumentStoreResult<bool> {
                (**self).collection_exists(name).await
            }

            async fn put(
                &self,
                collection: &str,
                id: &str,
                document: Document,
                options: &Options,
            ) -> DocumentStoreResult<String> {
                (**self).put(collection, id, document, options).await
            }

            async fn create_doc(
                &self,
                collection: &str,
                document: Document,
                options: &Options,
            ) -> DocumentStoreResult<(String, String)> {
                (**self).create_doc(collection, document, options).await
            }

            async fn get(&self, collection: &str, id: &str, options: &Options) -> DocumentStoreResult<Document> {
                (**self).get(collection, id, options).await
            }

            async fn delete(
                &self,
                collection: &str,
                id: &str,
                rev: &str,
                options: &Options,
            ) -> DocumentStoreResult<String> {
                (**self).delete(collection, id, rev, options).await
            }

            async fn all_docs(&self, collection: &str, options: &Options) -> DocumentStoreResult<BoxProducer<Row>> {
                (**self).all_docs(collection, options).await
            }

            async fn changes(&self, collection: &str, options: &Options) -> DocumentStoreResult<BoxProducer<Change>> {
                (**self).changes(collection, options).await
            }

            fn bulk_docer(&self) -> Option<&dyn BulkDocer> {
                (**self).bulk_docer()
            }

            fn finder(&self) -> Option<&dyn Finder> {
                (**self).finder()
            }

            fn securer(&self) -> Option<&dyn SecurityBackend> {
                (**self).securer()
            }

            async fn close(&self) -> DocumentStoreResult<()> {
                (**self).close().await
            }
        }
    )*};
}

forward_store_backend!(Box, Arc);

/// Factory trait for creating backend instances.
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
