//! Main doclayer crate providing a unified interface for document storage.
//!
//! This crate is the primary entry point for users of the doclayer framework.
//! It re-exports the core types and functionality from various sub-crates and provides
//! convenient access to different storage backends.
//!
//! # Features
//!
//! - **One cursor for every multi-row call** - Bulk results, row sets and changes feeds
//!   share the same cancellable, close-safe iteration semantics
//! - **Bulk writes everywhere** - Backends without native bulk support get a per-document
//!   emulation that reports results exactly like the native path
//! - **Capability probing** - Optional backend features are discovered at runtime and
//!   surface as "not implemented" errors when missing
//! - **Status codes** - Every error maps onto an HTTP-style status
//!
//! # Quick Start
//!
//! ```ignore
//! use bson::doc;
//! use doclayer::{prelude::*, memory::InMemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = InMemoryStore::builder().with_collection("users").build().await?;
//!     let store = DocumentStore::new(backend);
//!     let users = store.collection("users");
//!     let cancel = CancellationToken::new();
//!
//!     let results = users
//!         .bulk_docs(
//!             &cancel,
//!             vec![doc! { "_id": "alice", "age": 30 }, doc! { "name": "Bob" }],
//!             Options::default(),
//!         )
//!         .await?;
//!     for result in results.collect().await? {
//!         println!("{} -> {} ({:?})", result.id, result.rev, result.error);
//!     }
//!
//!     let adults = users
//!         .find(&cancel, doc! { "age": { "$gte": 18 } }, Options::default())
//!         .await?;
//!     while adults.advance().await {
//!         println!("{:?}", adults.doc());
//!     }
//!     adults.close().await?;
//!
//!     store.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Dynamic Dispatch
//!
//! A store bound to a concrete backend can be converted into a [`DynDocumentStore`]
//! with `into_dyn`, for when the backend is chosen at runtime:
//!
//! ```ignore
//! let store: DynDocumentStore = DocumentStore::new(backend).into_dyn();
//! let users = store.collection("users");
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing
//! - `mock` - Scriptable backend recording its calls (requires the `mock` feature)
//!
//! [`DynDocumentStore`]: store::DynDocumentStore

pub mod prelude;

pub use doclayer_core::{
    backend, bulk, changes, collection, document, error, iter, options, rows, store,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use doclayer_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// Scriptable backend for tests.
///
/// This module is only available when the `mock` feature is enabled.
#[cfg(feature = "mock")]
pub mod mock {
    pub use doclayer_mock::{MockCall, MockStore, MockStoreBuilder};
}
