//! Error types and result types for document store operations.
//!
//! Every error carries an optional HTTP-style status code so callers can classify
//! failures uniformly, whichever backend produced them. Use [`http_status`] to project
//! an optional error onto a status code.
//!
//! ```ignore
//! match collection.get("missing", Options::default()).await {
//!     Err(err) if err.status() == Some(404) => { /* not found */ }
//!     other => { other?; }
//! }
//! ```

use std::fmt;

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Status reported for errors that carry no status of their own.
pub const DEFAULT_ERROR_STATUS: u16 = 500;

/// An optional backend capability that can be missing from a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    BulkDocs,
    Find,
    Cluster,
    OpenRevs,
    Security,
    Config,
    Replication,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::BulkDocs => "BulkDocs interface",
            Capability::Find => "Find interface",
            Capability::Cluster => "cluster operations",
            Capability::OpenRevs => "OpenRevs interface",
            Capability::Security => "Security interface",
            Capability::Config => "Config interface",
            Capability::Replication => "replication",
        })
    }
}

/// Represents all possible errors that can occur when interacting with a document store.
///
/// Errors are cheap to clone: a cursor hands out the same per-item or terminal error
/// every time it is asked.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentStoreError {
    /// The store handle was closed before the operation started.
    #[error("client closed")]
    ClientClosed,
    /// The collection handle was closed before the operation started.
    #[error("database closed")]
    DatabaseClosed,
    /// The backend does not implement an optional capability.
    #[error("driver does not support {0}")]
    NotImplemented(Capability),
    /// A bulk write was requested with an empty document set.
    #[error("no documents provided")]
    NoDocuments,
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A document with the given ID already exists in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DocumentAlreadyExists(String, String),
    /// The requested document was not found in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document not found {0} in collection {1}")]
    DocumentNotFound(String, String),
    /// The requested collection does not exist in the store.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    /// A collection with the given name already exists.
    #[error("Collection already exists: {0}")]
    CollectionAlreadyExists(String),
    /// The write was based on a stale or missing revision.
    #[error("Document update conflict: {0}")]
    Conflict(String),
    /// The document violates schema constraints or has invalid structure.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// The request itself was malformed.
    #[error("Bad request: {0}")]
    BadRequest(String),
    /// The caller cancelled the operation before it completed.
    #[error("Operation cancelled")]
    Cancelled,
    /// An error reported by the underlying storage backend, optionally with its own status.
    #[error("Backend error: {message}")]
    Backend { status: Option<u16>, message: String },
    /// An unknown error occurred.
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl DocumentStoreError {
    /// Creates a backend error carrying the status code reported by the backend.
    pub fn backend(status: u16, message: impl Into<String>) -> Self {
        DocumentStoreError::Backend {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Returns the HTTP-style status code embedded in this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            DocumentStoreError::ClientClosed | DocumentStoreError::DatabaseClosed => Some(503),
            DocumentStoreError::NotImplemented(_) => Some(501),
            DocumentStoreError::NoDocuments
            | DocumentStoreError::Serialization(_)
            | DocumentStoreError::InvalidDocument(_)
            | DocumentStoreError::BadRequest(_) => Some(400),
            DocumentStoreError::DocumentNotFound(..) | DocumentStoreError::CollectionNotFound(_) => {
                Some(404)
            }
            DocumentStoreError::DocumentAlreadyExists(..) | DocumentStoreError::Conflict(_) => {
                Some(409)
            }
            DocumentStoreError::CollectionAlreadyExists(_) => Some(412),
            DocumentStoreError::Backend { status, .. } => *status,
            DocumentStoreError::Initialization(_)
            | DocumentStoreError::Cancelled
            | DocumentStoreError::Unknown(_) => None,
        }
    }
}

/// Errors that can report an HTTP-style status code.
///
/// Backends wrapping foreign error types can implement this to take part in
/// [`http_status`] classification.
pub trait StatusCoder {
    fn status_code(&self) -> Option<u16>;
}

impl StatusCoder for DocumentStoreError {
    fn status_code(&self) -> Option<u16> {
        self.status()
    }
}

/// Projects an optional error onto a status code.
///
/// `None` maps to `0`. An error that carries no status maps to
/// [`DEFAULT_ERROR_STATUS`].
pub fn http_status<E: StatusCoder + ?Sized>(err: Option<&E>) -> u16 {
    match err {
        None => 0,
        Some(err) => err.status_code().unwrap_or(DEFAULT_ERROR_STATUS),
    }
}

/// A specialized `Result` type for document store operations.
///
/// This type alias is used throughout the crate to indicate operations that may fail
/// with a [`DocumentStoreError`].
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_statuses() {
        assert_eq!(DocumentStoreError::ClientClosed.status(), Some(503));
        assert_eq!(DocumentStoreError::DatabaseClosed.status(), Some(503));
        assert_eq!(DocumentStoreError::NoDocuments.status(), Some(400));

        for capability in [
            Capability::BulkDocs,
            Capability::Find,
            Capability::Cluster,
            Capability::OpenRevs,
            Capability::Security,
            Capability::Config,
            Capability::Replication,
        ] {
            assert_eq!(DocumentStoreError::NotImplemented(capability).status(), Some(501));
        }
    }

    #[test]
    fn test_http_status_projection() {
        assert_eq!(http_status::<DocumentStoreError>(None), 0);
        assert_eq!(http_status(Some(&DocumentStoreError::Cancelled)), 500);
        assert_eq!(
            http_status(Some(&DocumentStoreError::Conflict("a".into()))),
            409
        );
        assert_eq!(
            http_status(Some(&DocumentStoreError::backend(418, "teapot"))),
            418
        );
        assert_eq!(
            http_status(Some(&DocumentStoreError::Backend {
                status: None,
                message: "boom".into(),
            })),
            500
        );
    }

    #[test]
    fn test_not_implemented_message() {
        assert_eq!(
            DocumentStoreError::NotImplemented(Capability::Find).to_string(),
            "driver does not support Find interface"
        );
    }
}
