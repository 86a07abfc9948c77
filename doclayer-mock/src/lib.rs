//! Scriptable backend for exercising doclayer's orchestration paths.
//!
//! [`MockStore`] records every call it receives and answers from a script set up
//! through [`MockStoreBuilder`]: per-document write failures, writes that never
//! complete, native bulk results with mid-stream errors or stalls, and canned rows.
//! It keeps no documents.
//!
//! # Example
//!
//! ```ignore
//! use doclayer::{backend::StoreBackendBuilder, mock::{MockCall, MockStore}};
//!
//! let backend = MockStore::builder()
//!     .native_bulk(false)
//!     .fail_put("a", DocumentStoreError::Conflict("a".into()))
//!     .build()
//!     .await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as doclayer_mock;

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use bson::Document;
use parking_lot::Mutex;

use doclayer_core::{
    backend::{
        BoxProducer, BulkDocer, BulkResult, Change, ResultProducer, Row, StoreBackend,
        StoreBackendBuilder,
    },
    document::{ID_FIELD, REV_FIELD, document_id},
    error::{DocumentStoreError, DocumentStoreResult},
    options::Options,
};

/// A backend call as seen by [`MockStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    CreateCollection(String),
    DropCollection(String),
    ListCollections,
    CollectionExists(String),
    Put { collection: String, id: String },
    CreateDoc { collection: String },
    Get { collection: String, id: String },
    Delete { collection: String, id: String, rev: String },
    AllDocs { collection: String },
    Changes { collection: String },
    BulkDocs { collection: String, count: usize },
    Close,
}

/// Producer replaying a scripted sequence of items and errors.
struct ScriptedProducer<T> {
    items: VecDeque<DocumentStoreResult<T>>,
    stall_after: Option<usize>,
    yielded: usize,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl<T: Send + 'static> ResultProducer<T> for ScriptedProducer<T> {
    async fn next(&mut self) -> DocumentStoreResult<Option<T>> {
        if self.stall_after == Some(self.yielded) {
            futures::future::pending::<()>().await;
        }

        match self.items.pop_front() {
            Some(Ok(item)) => {
                self.yielded += 1;
                Ok(Some(item))
            }
            Some(Err(err)) => Err(err),
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> DocumentStoreResult<()> {
        self.items.clear();
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Script {
    native_bulk: bool,
    put_failures: HashMap<String, DocumentStoreError>,
    stalled_puts: HashSet<String>,
    create_failure: Option<DocumentStoreError>,
    bulk_failure: Option<DocumentStoreError>,
    bulk_results: Option<Vec<DocumentStoreResult<BulkResult>>>,
    stall_bulk_after: Option<usize>,
    rows: Vec<Row>,
}

#[derive(Debug, Default)]
struct MockInner {
    script: Script,
    calls: Mutex<Vec<MockCall>>,
    generated: AtomicUsize,
    closed_producers: Arc<AtomicUsize>,
}

/// A scriptable [`StoreBackend`] that records its calls.
///
/// Clones share the same script and call log.
#[derive(Debug, Clone)]
pub struct MockStore {
    inner: Arc<MockInner>,
}

impl MockStore {
    pub fn builder() -> MockStoreBuilder {
        MockStoreBuilder::default()
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.inner.calls.lock().clone()
    }

    /// Number of producers handed out by this store that have been closed.
    pub fn closed_producers(&self) -> usize {
        self.inner.closed_producers.load(Ordering::SeqCst)
    }

    fn record(&self, call: MockCall) {
        self.inner.calls.lock().push(call);
    }

    fn generate_id(&self) -> String {
        format!("mock-{}", self.inner.generated.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn producer<T: Send + 'static>(
        &self,
        items: impl IntoIterator<Item = DocumentStoreResult<T>>,
        stall_after: Option<usize>,
    ) -> BoxProducer<T> {
        Box::new(ScriptedProducer {
            items: items.into_iter().collect(),
            stall_after,
            yielded: 0,
            closed: self.inner.closed_producers.clone(),
        })
    }
}

fn rev_for(id: &str) -> String {
    format!("1-{id}")
}

#[async_trait]
impl StoreBackend for MockStore {
    async fn create_collection(&self, name: &str, _options: &Options) -> DocumentStoreResult<()> {
        self.record(MockCall::CreateCollection(name.to_string()));
        Ok(())
    }

    async fn drop_collection(&self, name: &str, _options: &Options) -> DocumentStoreResult<()> {
        self.record(MockCall::DropCollection(name.to_string()));
        Ok(())
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        self.record(MockCall::ListCollections);
        Ok(Vec::new())
    }

    async fn collection_exists(&self, name: &str) -> DocumentStoreResult<bool> {
        self.record(MockCall::CollectionExists(name.to_string()));
        Ok(true)
    }

    async fn put(
        &self,
        collection: &str,
        id: &str,
        _document: Document,
        _options: &Options,
    ) -> DocumentStoreResult<String> {
        self.record(MockCall::Put {
            collection: collection.to_string(),
            id: id.to_string(),
        });

        if self.inner.script.stalled_puts.contains(id) {
            futures::future::pending::<()>().await;
        }
        if let Some(err) = self.inner.script.put_failures.get(id) {
            return Err(err.clone());
        }

        Ok(rev_for(id))
    }

    async fn create_doc(
        &self,
        collection: &str,
        _document: Document,
        _options: &Options,
    ) -> DocumentStoreResult<(String, String)> {
        self.record(MockCall::CreateDoc {
            collection: collection.to_string(),
        });

        if let Some(err) = &self.inner.script.create_failure {
            return Err(err.clone());
        }

        let id = self.generate_id();
        let rev = rev_for(&id);
        Ok((id, rev))
    }

    async fn get(
        &self,
        collection: &str,
        id: &str,
        _options: &Options,
    ) -> DocumentStoreResult<Document> {
        self.record(MockCall::Get {
            collection: collection.to_string(),
            id: id.to_string(),
        });

        let mut document = Document::new();
        document.insert(ID_FIELD, id);
        document.insert(REV_FIELD, rev_for(id));
        Ok(document)
    }

    async fn delete(
        &self,
        collection: &str,
        id: &str,
        rev: &str,
        _options: &Options,
    ) -> DocumentStoreResult<String> {
        self.record(MockCall::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
            rev: rev.to_string(),
        });

        Ok(format!("2-{id}"))
    }

    async fn all_docs(
        &self,
        collection: &str,
        _options: &Options,
    ) -> DocumentStoreResult<BoxProducer<Row>> {
        self.record(MockCall::AllDocs {
            collection: collection.to_string(),
        });

        Ok(self.producer(self.inner.script.rows.iter().cloned().map(Ok), None))
    }

    async fn changes(
        &self,
        collection: &str,
        _options: &Options,
    ) -> DocumentStoreResult<BoxProducer<Change>> {
        self.record(MockCall::Changes {
            collection: collection.to_string(),
        });

        Ok(self.producer(Vec::new(), None))
    }

    fn bulk_docer(&self) -> Option<&dyn BulkDocer> {
        self.inner
            .script
            .native_bulk
            .then_some(self as &dyn BulkDocer)
    }

    async fn close(&self) -> DocumentStoreResult<()> {
        self.record(MockCall::Close);
        Ok(())
    }
}

#[async_trait]
impl BulkDocer for MockStore {
    async fn bulk_docs(
        &self,
        collection: &str,
        documents: Vec<Document>,
        _options: &Options,
    ) -> DocumentStoreResult<BoxProducer<BulkResult>> {
        self.record(MockCall::BulkDocs {
            collection: collection.to_string(),
            count: documents.len(),
        });

        let script = &self.inner.script;
        if let Some(err) = &script.bulk_failure {
            return Err(err.clone());
        }

        let results = match &script.bulk_results {
            Some(results) => results.clone(),
            None => documents
                .iter()
                .map(|document| {
                    let id = document_id(document).map_or_else(|| self.generate_id(), str::to_string);
                    let rev = rev_for(&id);
                    Ok(BulkResult::ok(id, rev))
                })
                .collect(),
        };

        Ok(self.producer(results, script.stall_bulk_after))
    }
}

/// Builder for [`MockStore`]. Native bulk writes are enabled by default.
#[derive(Debug)]
pub struct MockStoreBuilder {
    script: Script,
}

impl Default for MockStoreBuilder {
    fn default() -> Self {
        Self {
            script: Script {
                native_bulk: true,
                ..Script::default()
            },
        }
    }
}

impl MockStoreBuilder {
    pub fn native_bulk(mut self, enabled: bool) -> Self {
        self.script.native_bulk = enabled;
        self
    }

    /// Fails every `put` of document `id` with `err`.
    pub fn fail_put(mut self, id: impl Into<String>, err: DocumentStoreError) -> Self {
        self.script.put_failures.insert(id.into(), err);
        self
    }

    /// Makes every `put` of document `id` wait forever.
    pub fn stall_put(mut self, id: impl Into<String>) -> Self {
        self.script.stalled_puts.insert(id.into());
        self
    }

    /// Fails every `create_doc` with `err`.
    pub fn fail_create(mut self, err: DocumentStoreError) -> Self {
        self.script.create_failure = Some(err);
        self
    }

    /// Fails native bulk writes before any result is produced.
    pub fn fail_bulk(mut self, err: DocumentStoreError) -> Self {
        self.script.bulk_failure = Some(err);
        self
    }

    /// Replays `results` from native bulk writes; an `Err` ends the stream with that error.
    pub fn bulk_results(mut self, results: Vec<DocumentStoreResult<BulkResult>>) -> Self {
        self.script.bulk_results = Some(results);
        self
    }

    /// Makes the native bulk producer wait forever after yielding `count` results.
    pub fn stall_bulk_after(mut self, count: usize) -> Self {
        self.script.stall_bulk_after = Some(count);
        self
    }

    /// Rows returned by `all_docs`.
    pub fn rows(mut self, rows: Vec<Row>) -> Self {
        self.script.rows = rows;
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for MockStoreBuilder {
    type Backend = MockStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(MockStore {
            inner: Arc::new(MockInner {
                script: self.script,
                ..MockInner::default()
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    #[tokio::test]
    async fn test_scripted_bulk_results_and_close_count() {
        let store = MockStore::builder()
            .bulk_results(vec![
                Ok(BulkResult::ok("a", "1-a")),
                Err(DocumentStoreError::backend(502, "upstream")),
            ])
            .build()
            .await
            .unwrap();

        let mut producer = store
            .bulk_docs("c", vec![doc! {}], &Options::default())
            .await
            .unwrap();

        assert_eq!(producer.next().await.unwrap().unwrap().id, "a");
        assert_eq!(producer.next().await.unwrap_err().status(), Some(502));

        producer.close().await.unwrap();
        assert_eq!(store.closed_producers(), 1);
        assert_eq!(
            store.calls(),
            vec![MockCall::BulkDocs {
                collection: "c".to_string(),
                count: 1
            }]
        );
    }

    #[tokio::test]
    async fn test_put_failures_and_generated_ids() {
        let store = MockStore::builder()
            .native_bulk(false)
            .fail_put("a", DocumentStoreError::Conflict("a".to_string()))
            .build()
            .await
            .unwrap();
        let none = Options::default();

        assert!(store.bulk_docer().is_none());
        assert!(store.put("c", "a", doc! {}, &none).await.is_err());
        assert_eq!(store.put("c", "b", doc! {}, &none).await.unwrap(), "1-b");
        assert_eq!(
            store.create_doc("c", doc! {}, &none).await.unwrap(),
            ("mock-1".to_string(), "1-mock-1".to_string())
        );
    }
}
