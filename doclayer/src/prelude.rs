//! Convenient re-exports of commonly used types from doclayer.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use doclayer::prelude::*;
//! ```
//!
//! This provides access to:
//! - The document store, collection handles and backend traits
//! - Cursors over bulk results, rows and changes
//! - Document inputs and per-call options
//! - Error types and status codes

pub use doclayer_core::{
    backend::{
        BulkDocer, BulkResult, Change, Finder, ResultProducer, Row, Security, SecurityBackend,
        StoreBackend, StoreBackendBuilder,
    },
    bulk::BulkResults,
    changes::Changes,
    collection::Collection,
    document::{DocumentInput, from_document},
    error::{Capability, DocumentStoreError, DocumentStoreResult, StatusCoder, http_status},
    iter::{Cursor, CursorPhase},
    options::{DocOption, Options, Params, include_docs, param, rev},
    rows::Rows,
    store::{DocumentStore, DynDocumentStore},
};

pub use tokio_util::sync::CancellationToken;
