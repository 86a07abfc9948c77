//! In-memory document storage backend for doclayer.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is ideal for development,
//! testing, and small-scale deployments.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Revisions** - Every write produces a new `<generation>-<hash>` revision; stale writes conflict
//! - **Changes feed** - Per-collection sequence numbers, including deletions
//! - **Selector queries** - `find` with equality, comparison, membership and boolean operators
//! - **Native bulk writes** - Can be switched off to exercise per-document emulation
//!
//! # Quick Start
//!
//! ```ignore
//! use bson::doc;
//! use doclayer::{prelude::*, memory::InMemoryStore};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = InMemoryStore::builder().with_collection("users").build().await?;
//!     let store = DocumentStore::new(backend);
//!     let users = store.collection("users");
//!
//!     users.put("alice", doc! { "name": "Alice" }, Options::default()).await?;
//!     let rows = users.all_docs(&CancellationToken::new(), include_docs()).await?;
//!     while rows.advance().await {
//!         println!("{} {:?}", rows.id(), rows.doc());
//!     }
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as doclayer_memory;

mod selector;
pub mod store;

pub use store::{InMemoryStore, InMemoryStoreBuilder};

pub const TRACING_TARGET: &str = "doclayer_memory";
