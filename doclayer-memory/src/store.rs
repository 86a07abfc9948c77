//! In-memory storage implementation for document stores.
//!
//! Documents are kept per collection in ordered maps behind an async-aware read-write
//! lock. Every write assigns a new `<generation>-<hash>` revision and a collection-wide
//! sequence number, so the store can answer revision checks and changes feeds the same
//! way a replicated document database would.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::Arc,
};

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use mea::rwlock::RwLock;
use uuid::Uuid;

use doclayer_core::{
    backend::{
        BoxProducer, BulkDocer, BulkResult, Change, Finder, ResultProducer, Row, Security,
        SecurityBackend, StoreBackend, StoreBackendBuilder,
    },
    document::{ID_FIELD, REV_FIELD, document_id},
    error::{DocumentStoreError, DocumentStoreResult},
    options::Options,
};

use crate::{TRACING_TARGET, selector};

type StoreMap = HashMap<String, CollectionData>;

#[derive(Debug, Clone)]
struct StoredDocument {
    rev: String,
    generation: u64,
    /// The document body without `_id` and `_rev`.
    body: Document,
    deleted: bool,
    seq: u64,
}

impl StoredDocument {
    fn materialize(&self, id: &str) -> Document {
        let mut document = Document::new();
        document.insert(ID_FIELD, id);
        document.insert(REV_FIELD, self.rev.as_str());
        document.extend(self.body.clone());
        document
    }

    fn row(&self, id: &str, include_doc: bool) -> Row {
        Row {
            id: id.to_string(),
            key: Bson::String(id.to_string()),
            value: Bson::Document(doc! { "rev": self.rev.as_str() }),
            doc: include_doc.then(|| self.materialize(id)),
        }
    }
}

#[derive(Debug, Default)]
struct CollectionData {
    documents: BTreeMap<String, StoredDocument>,
    seq: u64,
    security: Security,
}

impl CollectionData {
    fn live(&self, collection: &str, id: &str) -> DocumentStoreResult<&StoredDocument> {
        self.documents
            .get(id)
            .filter(|stored| !stored.deleted)
            .ok_or_else(|| DocumentStoreError::DocumentNotFound(id.to_string(), collection.to_string()))
    }

    /// Writes `body` under `id`, checking the expected revision against the stored one.
    ///
    /// A `_rev` field in the body wins over `expected_rev`. Writing over a tombstone or a
    /// missing identifier must not carry a revision.
    fn write(
        &mut self,
        collection: &str,
        id: &str,
        mut body: Document,
        expected_rev: Option<String>,
    ) -> DocumentStoreResult<String> {
        body.remove(ID_FIELD);
        let expected = body
            .remove(REV_FIELD)
            .and_then(|rev| rev.as_str().map(str::to_string))
            .filter(|rev| !rev.is_empty())
            .or(expected_rev);

        let generation = match self.documents.get(id) {
            Some(stored) if !stored.deleted => {
                if expected.as_deref() != Some(stored.rev.as_str()) {
                    return Err(DocumentStoreError::Conflict(format!(
                        "document {id} in collection {collection} is not at the given revision"
                    )));
                }
                stored.generation + 1
            }
            Some(tombstone) => tombstone.generation + 1,
            None if expected.is_some() => {
                return Err(DocumentStoreError::Conflict(format!(
                    "document {id} in collection {collection} has no revision to update"
                )));
            }
            None => 1,
        };

        Ok(self.store(id, generation, body, false))
    }

    fn delete(&mut self, collection: &str, id: &str, rev: &str) -> DocumentStoreResult<String> {
        let stored = self.live(collection, id)?;
        if stored.rev != rev {
            return Err(DocumentStoreError::Conflict(format!(
                "document {id} in collection {collection} is not at revision {rev}"
            )));
        }

        let generation = stored.generation + 1;
        Ok(self.store(id, generation, Document::new(), true))
    }

    fn store(&mut self, id: &str, generation: u64, body: Document, deleted: bool) -> String {
        let rev = format!("{generation}-{}", Uuid::new_v4().simple());
        self.seq += 1;
        self.documents.insert(
            id.to_string(),
            StoredDocument {
                rev: rev.clone(),
                generation,
                body,
                deleted,
                seq: self.seq,
            },
        );
        rev
    }
}

fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn collection_not_found(name: &str) -> DocumentStoreError {
    DocumentStoreError::CollectionNotFound(name.to_string())
}

fn skip_and_limit<T>(items: impl Iterator<Item = T>, options: &Options) -> VecDeque<T> {
    let skip = options.get_u64("skip").unwrap_or(0) as usize;
    let limit = options.get_u64("limit").map_or(usize::MAX, |limit| limit as usize);

    items.skip(skip).take(limit).collect()
}

/// Producer over a snapshot taken when the operation ran.
struct SnapshotProducer<T> {
    items: VecDeque<T>,
}

impl<T: Send + 'static> SnapshotProducer<T> {
    fn boxed(items: VecDeque<T>) -> BoxProducer<T> {
        Box::new(Self { items })
    }
}

#[async_trait]
impl<T: Send + 'static> ResultProducer<T> for SnapshotProducer<T> {
    async fn next(&mut self) -> DocumentStoreResult<Option<T>> {
        Ok(self.items.pop_front())
    }

    async fn close(&mut self) -> DocumentStoreResult<()> {
        self.items.clear();
        Ok(())
    }
}

/// Thread-safe in-memory document storage backend.
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing it
/// to be safely shared across async tasks. Multiple clones of the same instance share
/// the same underlying data.
///
/// Besides the required operations it advertises selector queries, security objects,
/// and, unless disabled through the builder, native bulk writes.
///
/// # Performance
///
/// `find` scans every document in a collection (no indexing).
///
/// # Example
///
/// ```ignore
/// use doclayer_memory::InMemoryStore;
/// use doclayer::store::DocumentStore;
///
/// let backend = InMemoryStore::builder()
///     .with_collection("users")
///     .build()
///     .await?;
/// let store = DocumentStore::new(backend);
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryStore {
    /// collection_name -> (document_id -> document)
    store: Arc<RwLock<StoreMap>>,
    native_bulk: bool,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store with native bulk writes enabled.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
            native_bulk: true,
        }
    }

    /// Creates a builder for constructing an `InMemoryStore` with custom options.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn create_collection(&self, name: &str, _options: &Options) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;

        if store.contains_key(name) {
            return Err(DocumentStoreError::CollectionAlreadyExists(name.to_string()));
        }

        store.insert(name.to_string(), CollectionData::default());
        Ok(())
    }

    async fn drop_collection(&self, name: &str, _options: &Options) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;

        if store.remove(name).is_none() {
            return Err(collection_not_found(name));
        }

        Ok(())
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        let mut names: Vec<String> = self.store.read().await.keys().cloned().collect();
        names.sort();

        Ok(names)
    }

    async fn collection_exists(&self, name: &str) -> DocumentStoreResult<bool> {
        Ok(self.store.read().await.contains_key(name))
    }

    async fn put(
        &self,
        collection: &str,
        id: &str,
        document: Document,
        options: &Options,
    ) -> DocumentStoreResult<String> {
        let mut store = self.store.write().await;
        let data = store
            .get_mut(collection)
            .ok_or_else(|| collection_not_found(collection))?;

        data.write(collection, id, document, options.get_str("rev"))
    }

    async fn create_doc(
        &self,
        collection: &str,
        document: Document,
        _options: &Options,
    ) -> DocumentStoreResult<(String, String)> {
        let id = document_id(&document).map_or_else(generate_id, str::to_string);

        let mut store = self.store.write().await;
        let data = store
            .get_mut(collection)
            .ok_or_else(|| collection_not_found(collection))?;

        if data.live(collection, &id).is_ok() {
            return Err(DocumentStoreError::DocumentAlreadyExists(id, collection.to_string()));
        }

        let rev = data.write(collection, &id, document, None)?;
        Ok((id, rev))
    }

    async fn get(
        &self,
        collection: &str,
        id: &str,
        options: &Options,
    ) -> DocumentStoreResult<Document> {
        let store = self.store.read().await;
        let data = store
            .get(collection)
            .ok_or_else(|| collection_not_found(collection))?;
        let stored = data.live(collection, id)?;

        // Only the leaf revision is kept.
        if let Some(rev) = options.get_str("rev")
            && rev != stored.rev
        {
            return Err(DocumentStoreError::DocumentNotFound(
                format!("{id}@{rev}"),
                collection.to_string(),
            ));
        }

        Ok(stored.materialize(id))
    }

    async fn delete(
        &self,
        collection: &str,
        id: &str,
        rev: &str,
        _options: &Options,
    ) -> DocumentStoreResult<String> {
        let mut store = self.store.write().await;
        let data = store
            .get_mut(collection)
            .ok_or_else(|| collection_not_found(collection))?;

        data.delete(collection, id, rev)
    }

    async fn all_docs(
        &self,
        collection: &str,
        options: &Options,
    ) -> DocumentStoreResult<BoxProducer<Row>> {
        let include_docs = options.get_bool("include_docs").unwrap_or(false);
        let start_key = options.get_str("start_key");
        let end_key = options.get_str("end_key");

        let store = self.store.read().await;
        let data = store
            .get(collection)
            .ok_or_else(|| collection_not_found(collection))?;

        let mut rows: Vec<Row> = data
            .documents
            .iter()
            .filter(|(_, stored)| !stored.deleted)
            .filter(|(id, _)| start_key.as_deref().is_none_or(|start| id.as_str() >= start))
            .filter(|(id, _)| end_key.as_deref().is_none_or(|end| id.as_str() <= end))
            .map(|(id, stored)| stored.row(id, include_docs))
            .collect();

        if options.get_bool("descending").unwrap_or(false) {
            rows.reverse();
        }

        Ok(SnapshotProducer::boxed(skip_and_limit(rows.into_iter(), options)))
    }

    async fn changes(
        &self,
        collection: &str,
        options: &Options,
    ) -> DocumentStoreResult<BoxProducer<Change>> {
        let include_docs = options.get_bool("include_docs").unwrap_or(false);
        let since = options.get_u64("since").unwrap_or(0);

        let store = self.store.read().await;
        let data = store
            .get(collection)
            .ok_or_else(|| collection_not_found(collection))?;

        let mut changed: Vec<(&String, &StoredDocument)> = data
            .documents
            .iter()
            .filter(|(_, stored)| stored.seq > since)
            .collect();
        changed.sort_by_key(|(_, stored)| stored.seq);

        let changes = changed.into_iter().map(|(id, stored)| Change {
            id: id.clone(),
            seq: stored.seq.to_string(),
            deleted: stored.deleted,
            changes: vec![stored.rev.clone()],
            doc: (include_docs && !stored.deleted).then(|| stored.materialize(id)),
        });

        Ok(SnapshotProducer::boxed(skip_and_limit(changes, options)))
    }

    fn bulk_docer(&self) -> Option<&dyn BulkDocer> {
        self.native_bulk.then_some(self as &dyn BulkDocer)
    }

    fn finder(&self) -> Option<&dyn Finder> {
        Some(self)
    }

    fn securer(&self) -> Option<&dyn SecurityBackend> {
        Some(self)
    }
}

#[async_trait]
impl BulkDocer for InMemoryStore {
    async fn bulk_docs(
        &self,
        collection: &str,
        documents: Vec<Document>,
        _options: &Options,
    ) -> DocumentStoreResult<BoxProducer<BulkResult>> {
        let mut store = self.store.write().await;
        let data = store
            .get_mut(collection)
            .ok_or_else(|| collection_not_found(collection))?;

        let results: VecDeque<BulkResult> = documents
            .into_iter()
            .map(|document| {
                let id = document_id(&document).map_or_else(generate_id, str::to_string);
                match data.write(collection, &id, document, None) {
                    Ok(rev) => BulkResult::ok(id, rev),
                    Err(err) => BulkResult::failed(id, err),
                }
            })
            .collect();

        tracing::trace!(
            target: TRACING_TARGET,
            collection,
            count = results.len(),
            failed = results.iter().filter(|result| result.error.is_some()).count(),
            "Applied bulk write"
        );

        Ok(SnapshotProducer::boxed(results))
    }
}

#[async_trait]
impl Finder for InMemoryStore {
    async fn find(
        &self,
        collection: &str,
        selector: Document,
        options: &Options,
    ) -> DocumentStoreResult<BoxProducer<Row>> {
        let store = self.store.read().await;
        let data = store
            .get(collection)
            .ok_or_else(|| collection_not_found(collection))?;

        let mut rows = Vec::new();
        for (id, stored) in data.documents.iter().filter(|(_, stored)| !stored.deleted) {
            let document = stored.materialize(id);
            if selector::matches(&document, &selector)? {
                rows.push(Row {
                    doc: Some(document),
                    ..stored.row(id, false)
                });
            }
        }

        Ok(SnapshotProducer::boxed(skip_and_limit(rows.into_iter(), options)))
    }
}

#[async_trait]
impl SecurityBackend for InMemoryStore {
    async fn security(&self, collection: &str) -> DocumentStoreResult<Security> {
        self.store
            .read()
            .await
            .get(collection)
            .map(|data| data.security.clone())
            .ok_or_else(|| collection_not_found(collection))
    }

    async fn set_security(&self, collection: &str, security: &Security) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;
        let data = store
            .get_mut(collection)
            .ok_or_else(|| collection_not_found(collection))?;

        data.security = security.clone();
        Ok(())
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// # Example
///
/// ```ignore
/// use doclayer_memory::InMemoryStore;
/// use doclayer::backend::StoreBackendBuilder;
///
/// let store = InMemoryStore::builder()
///     .native_bulk(false)
///     .with_collection("users")
///     .build()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryStoreBuilder {
    native_bulk: bool,
    collections: Vec<String>,
}

impl Default for InMemoryStoreBuilder {
    fn default() -> Self {
        Self {
            native_bulk: true,
            collections: Vec::new(),
        }
    }
}

impl InMemoryStoreBuilder {
    /// Whether the store advertises native bulk writes. Enabled by default.
    pub fn native_bulk(mut self, enabled: bool) -> Self {
        self.native_bulk = enabled;
        self
    }

    /// Creates the named collection when the store is built.
    pub fn with_collection(mut self, name: impl Into<String>) -> Self {
        self.collections.push(name.into());
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let store: StoreMap = self
            .collections
            .into_iter()
            .map(|name| (name, CollectionData::default()))
            .collect();

        Ok(InMemoryStore {
            store: Arc::new(RwLock::new(store)),
            native_bulk: self.native_bulk,
        })
    }
}
