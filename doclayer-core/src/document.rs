//! Document payloads and their normalization.
//!
//! Callers hand documents to the store in whatever shape is convenient: a BSON
//! document, a JSON value, raw JSON bytes, or a reader producing JSON. Every payload is
//! normalized to a [`bson::Document`] before it reaches a backend, and the reserved
//! `_id` and `_rev` fields carry the document identifier and the revision being
//! replaced.

use std::{fmt, io::Read};

use bson::{Bson, Document, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Field holding the document identifier.
pub const ID_FIELD: &str = "_id";
/// Field holding the document revision.
pub const REV_FIELD: &str = "_rev";

/// A document payload as supplied by the caller.
pub enum DocumentInput {
    /// An already structured BSON value; must be a document.
    Bson(Bson),
    /// A JSON value; must be an object.
    Json(Value),
    /// Pre-serialized JSON.
    Raw(Vec<u8>),
    /// A stream yielding JSON.
    Reader(Box<dyn Read + Send>),
}

impl DocumentInput {
    /// Wraps a reader producing JSON.
    pub fn reader(reader: impl Read + Send + 'static) -> Self {
        DocumentInput::Reader(Box::new(reader))
    }

    /// Serializes any serde value into a document payload.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn serialize<T: Serialize + ?Sized>(value: &T) -> DocumentStoreResult<Self> {
        Ok(DocumentInput::Bson(serialize_to_bson(value)?))
    }

    /// Converts the payload into its canonical structured form.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidDocument`] if the payload cannot be read or
    /// parsed, or if it is not an object.
    pub fn normalize(self) -> DocumentStoreResult<Document> {
        let bson = match self {
            DocumentInput::Bson(bson) => bson,
            DocumentInput::Json(value) => json_to_bson(&value)?,
            DocumentInput::Raw(bytes) => {
                let value: Value = serde_json::from_slice(&bytes).map_err(invalid)?;
                json_to_bson(&value)?
            }
            DocumentInput::Reader(reader) => {
                let value: Value = serde_json::from_reader(reader).map_err(invalid)?;
                json_to_bson(&value)?
            }
        };

        match bson {
            Bson::Document(document) => Ok(document),
            other => Err(DocumentStoreError::InvalidDocument(format!(
                "expected an object, found {:?}",
                other.element_type()
            ))),
        }
    }
}

fn invalid(err: impl fmt::Display) -> DocumentStoreError {
    DocumentStoreError::InvalidDocument(err.to_string())
}

fn json_to_bson(value: &Value) -> DocumentStoreResult<Bson> {
    serialize_to_bson(value).map_err(invalid)
}

impl fmt::Debug for DocumentInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentInput::Bson(bson) => f.debug_tuple("Bson").field(bson).finish(),
            DocumentInput::Json(value) => f.debug_tuple("Json").field(value).finish(),
            DocumentInput::Raw(bytes) => f
                .debug_tuple("Raw")
                .field(&String::from_utf8_lossy(bytes))
                .finish(),
            DocumentInput::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

impl From<Document> for DocumentInput {
    fn from(document: Document) -> Self {
        DocumentInput::Bson(Bson::Document(document))
    }
}

impl From<Bson> for DocumentInput {
    fn from(bson: Bson) -> Self {
        DocumentInput::Bson(bson)
    }
}

impl From<Value> for DocumentInput {
    fn from(value: Value) -> Self {
        DocumentInput::Json(value)
    }
}

impl From<Vec<u8>> for DocumentInput {
    fn from(bytes: Vec<u8>) -> Self {
        DocumentInput::Raw(bytes)
    }
}

impl From<String> for DocumentInput {
    fn from(raw: String) -> Self {
        DocumentInput::Raw(raw.into_bytes())
    }
}

impl From<&str> for DocumentInput {
    fn from(raw: &str) -> Self {
        DocumentInput::Raw(raw.as_bytes().to_vec())
    }
}

/// Returns the explicit identifier carried by a document, if any.
pub fn document_id(document: &Document) -> Option<&str> {
    document
        .get_str(ID_FIELD)
        .ok()
        .filter(|id| !id.is_empty())
}

/// Returns the revision carried by a document, if any.
pub fn document_rev(document: &Document) -> Option<&str> {
    document
        .get_str(REV_FIELD)
        .ok()
        .filter(|rev| !rev.is_empty())
}

/// Decodes a stored document into a typed value.
///
/// # Errors
///
/// Returns an error if the document does not match the shape of `T`.
pub fn from_document<T: DeserializeOwned>(document: Document) -> DocumentStoreResult<T> {
    Ok(deserialize_from_bson(Bson::Document(document))?)
}
