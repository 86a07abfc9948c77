//! A thin JSON document database abstraction layer that provides a unified interface for working with document stores.
//!
//! This crate is the core of the doclayer project and provides:
//!
//! - **Store backend abstraction** ([`backend`]) - The contract a backend implements, with optional capabilities discovered at runtime
//! - **Cursors** ([`iter`]) - A concurrency-safe, cancellable cursor shared by every multi-row operation
//! - **Bulk writes** ([`bulk`]) - Native delegation or per-document emulation behind one result type
//! - **Row sets and changes feeds** ([`rows`], [`changes`]) - Typed views over cursors
//! - **Collections interface** ([`collection`]) - Document CRUD scoped to one collection
//! - **Document store** ([`store`]) - Main entry point wrapping a backend
//! - **Documents** ([`document`]) - Accepted payload shapes and their normalization
//! - **Options** ([`options`]) - Per-call options merged and applied onto backend targets
//! - **Error handling** ([`error`]) - Error types, status codes, and result types
//!
//! # Example
//!
//! ```ignore
//! use bson::doc;
//! use doclayer::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! let users = store.collection("users");
//! let results = users
//!     .bulk_docs(
//!         &CancellationToken::new(),
//!         vec![doc! { "_id": "alice" }, doc! { "name": "Bob" }],
//!         Options::default(),
//!     )
//!     .await?;
//!
//! while results.advance().await {
//!     match results.update_err() {
//!         Some(err) => println!("{} failed: {err}", results.id()),
//!         None => println!("{} is at {}", results.id(), results.rev()),
//!     }
//! }
//! if let Some(err) = results.err() {
//!     return Err(err);
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as doclayer_core;

pub mod backend;
pub mod bulk;
pub mod changes;
pub mod collection;
pub mod document;
pub mod error;
pub mod iter;
pub mod options;
pub mod rows;
pub mod store;
mod tracker;

pub const TRACING_TARGET: &str = "doclayer_core";
pub const TRACING_TARGET_BULK: &str = "doclayer_core::bulk";
pub const TRACING_TARGET_CURSOR: &str = "doclayer_core::iter";
