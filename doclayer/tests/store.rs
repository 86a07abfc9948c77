use std::time::Duration;

use bson::doc;
use futures::StreamExt;
use serde::Deserialize;

use doclayer::{
    backend::{Row, Security, StoreBackendBuilder},
    error::{Capability, DocumentStoreError, http_status},
    memory::InMemoryStore,
    options::{Options, include_docs, param, rev},
    store::{DocumentStore, DynDocumentStore},
};
use doclayer_mock::MockStore;
use tokio_util::sync::CancellationToken;

async fn memory_store() -> DocumentStore<InMemoryStore> {
    let backend = InMemoryStore::builder()
        .with_collection("users")
        .build()
        .await
        .unwrap();
    DocumentStore::new(backend)
}

#[derive(Debug, Deserialize, PartialEq)]
struct User {
    #[serde(rename = "_id")]
    id: String,
    name: String,
    age: i32,
}

#[tokio::test]
async fn document_lifecycle() {
    let store = memory_store().await;
    let users = store.collection("users");

    let rev1 = users
        .put("alice", doc! { "name": "Alice", "age": 30 }, Options::default())
        .await
        .unwrap();

    let alice: User = users.get_as("alice", Options::default()).await.unwrap();
    assert_eq!(
        alice,
        User {
            id: "alice".into(),
            name: "Alice".into(),
            age: 30
        }
    );

    let stale = users
        .put("alice", doc! { "name": "Alice", "age": 31 }, Options::default())
        .await
        .unwrap_err();
    assert_eq!(http_status(Some(&stale)), 409);

    let rev2 = users
        .put("alice", doc! { "name": "Alice", "age": 31 }, rev(rev1.as_str()))
        .await
        .unwrap();
    assert!(rev2.starts_with("2-"));

    let err = users.delete("alice", &rev1, Options::default()).await.unwrap_err();
    assert!(matches!(err, DocumentStoreError::Conflict(_)));
    users.delete("alice", &rev2, Options::default()).await.unwrap();

    let err = users.get("alice", Options::default()).await.unwrap_err();
    assert_eq!(http_status(Some(&err)), 404);

    let err = users.put("", doc! {}, Options::default()).await.unwrap_err();
    assert_eq!(err.status(), Some(400));
}

#[tokio::test]
async fn create_doc_accepts_any_input() {
    let store = memory_store().await;
    let users = store.collection("users");

    let (id, _) = users
        .create_doc(r#"{"name": "Bob", "age": 20}"#, Options::default())
        .await
        .unwrap();
    let bob = users.get(&id, Options::default()).await.unwrap();
    assert_eq!(bob.get_str("name").unwrap(), "Bob");

    let err = users.create_doc("not json", Options::default()).await.unwrap_err();
    assert!(matches!(err, DocumentStoreError::InvalidDocument(_)));
}

#[tokio::test]
async fn all_docs_streams_rows() {
    let store = memory_store().await;
    let users = store.collection("users");
    for (id, age) in [("carol", 41), ("alice", 30), ("bob", 17)] {
        users
            .put(id, doc! { "name": id, "age": age }, Options::default())
            .await
            .unwrap();
    }

    let rows = users
        .all_docs(&CancellationToken::new(), Options::default())
        .await
        .unwrap();
    let mut ids = Vec::new();
    while rows.advance().await {
        assert!(rows.doc().is_none());
        ids.push(rows.id());
    }
    assert_eq!(ids, ["alice", "bob", "carol"]);
    assert_eq!(rows.err(), None);

    let rows = users
        .all_docs(
            &CancellationToken::new(),
            Options::merge([Options::from(include_docs()), Options::from(param("limit", 1))]),
        )
        .await
        .unwrap();
    assert!(rows.advance().await);
    let alice: User = rows.scan_doc().unwrap();
    assert_eq!(alice.age, 30);
    assert_eq!(rows.key(), bson::Bson::String("alice".into()));
    assert!(!rows.advance().await);

    let streamed: Vec<Row> = users
        .all_docs(&CancellationToken::new(), Options::default())
        .await
        .unwrap()
        .into_cursor()
        .into_stream()
        .map(Result::unwrap)
        .collect()
        .await;
    assert_eq!(streamed.len(), 3);
    assert_eq!(users.active_operations(), 0);
}

#[tokio::test]
async fn find_filters_with_selector() {
    let store = memory_store().await;
    let users = store.collection("users");
    for (id, age) in [("alice", 30), ("bob", 17)] {
        users
            .put(id, doc! { "name": id, "age": age }, Options::default())
            .await
            .unwrap();
    }

    let rows = users
        .find(
            &CancellationToken::new(),
            doc! { "age": { "$gte": 18 } },
            Options::default(),
        )
        .await
        .unwrap();
    assert!(rows.advance().await);
    assert_eq!(rows.id(), "alice");
    assert!(!rows.advance().await);

    let rows = users
        .find(
            &CancellationToken::new(),
            doc! { "age": { "$unknown": 1 } },
            Options::default(),
        )
        .await;
    assert_eq!(rows.unwrap_err().status(), Some(400));
}

#[tokio::test]
async fn changes_feed_resumes_from_sequence() {
    let store = memory_store().await;
    let users = store.collection("users");
    let rev = users.put("a", doc! {}, Options::default()).await.unwrap();
    users.put("b", doc! {}, Options::default()).await.unwrap();

    let changes = users
        .changes(&CancellationToken::new(), Options::default())
        .await
        .unwrap();
    let mut last_seq = String::new();
    while changes.advance().await {
        last_seq = changes.seq();
    }
    assert_eq!(last_seq, "2");

    users.delete("a", &rev, Options::default()).await.unwrap();

    let changes = users
        .changes(&CancellationToken::new(), param("since", last_seq))
        .await
        .unwrap();
    assert!(changes.advance().await);
    assert_eq!(changes.id(), "a");
    assert!(changes.deleted());
    assert_eq!(changes.changes().len(), 1);
    assert!(!changes.advance().await);
}

#[tokio::test]
async fn missing_capabilities_report_not_implemented() {
    let backend = MockStore::builder().build().await.unwrap();
    let store = DocumentStore::new(backend);
    let docs = store.collection("docs");

    let err = docs
        .find(&CancellationToken::new(), doc! {}, Options::default())
        .await
        .unwrap_err();
    assert_eq!(err, DocumentStoreError::NotImplemented(Capability::Find));
    assert_eq!(http_status(Some(&err)), 501);
    assert_eq!(err.to_string(), "driver does not support Find interface");

    let err = docs.security().await.unwrap_err();
    assert_eq!(err, DocumentStoreError::NotImplemented(Capability::Security));
}

#[tokio::test]
async fn security_objects_round_trip() {
    let store = memory_store().await;
    let users = store.collection("users");

    let mut security = users.security().await.unwrap();
    security.members.roles.push("readers".into());
    users.set_security(&security).await.unwrap();

    assert_eq!(users.security().await.unwrap(), security);
    assert_ne!(security, Security::default());
}

#[tokio::test]
async fn closed_store_refuses_operations() {
    let store = memory_store().await;
    let users = store.collection("users");

    let rows = users
        .all_docs(&CancellationToken::new(), Options::default())
        .await
        .unwrap();

    let pending = tokio::time::timeout(Duration::from_millis(30), store.close()).await;
    assert!(pending.is_err());

    rows.close().await.unwrap();
    tokio::time::timeout(Duration::from_secs(1), store.close())
        .await
        .unwrap()
        .unwrap();
    assert!(store.is_closed());

    let err = users.get("alice", Options::default()).await.unwrap_err();
    assert_eq!(err, DocumentStoreError::ClientClosed);
    assert_eq!(http_status(Some(&err)), 503);

    let err = store.list_collections().await.unwrap_err();
    assert_eq!(err, DocumentStoreError::ClientClosed);
}

#[tokio::test]
async fn dynamic_store_manages_collections() {
    let backend = InMemoryStore::builder().build().await.unwrap();
    let store: DynDocumentStore = DocumentStore::new(backend).into_dyn();

    store.create_collection("a", Options::default()).await.unwrap();
    store.create_collection("b", Options::default()).await.unwrap();

    let err = store.create_collection("a", Options::default()).await.unwrap_err();
    assert_eq!(http_status(Some(&err)), 412);
    assert_eq!(store.list_collections().await.unwrap(), ["a", "b"]);

    store.drop_collection("a", Options::default()).await.unwrap();
    assert!(!store.collection_exists("a").await.unwrap());

    let err = store
        .collection("a")
        .put("x", doc! {}, Options::default())
        .await
        .unwrap_err();
    assert_eq!(http_status(Some(&err)), 404);

    let results = store
        .collection("b")
        .bulk_docs(&CancellationToken::new(), vec![doc! { "_id": "x" }], Options::default())
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "x");
}
