//! Cursor over row sets (`all_docs`, `find`).

use bson::{Bson, Document};
use serde::de::DeserializeOwned;

use crate::{
    backend::Row,
    document::from_document,
    error::{DocumentStoreError, DocumentStoreResult},
    iter::{Cursor, CursorPhase},
};

/// Cursor over the rows of a row set.
#[derive(Debug)]
pub struct Rows {
    cursor: Cursor<Row>,
}

impl Rows {
    pub(crate) fn new(cursor: Cursor<Row>) -> Self {
        Self { cursor }
    }

    /// Moves to the next row. Returns `false` once the rows run out or iteration fails.
    pub async fn advance(&self) -> bool {
        self.cursor.advance().await
    }

    /// Document ID of the current row, or an empty string.
    pub fn id(&self) -> String {
        self.cursor
            .with_current(|row| row.id.clone())
            .unwrap_or_default()
    }

    /// Key of the current row, or `Null`.
    pub fn key(&self) -> Bson {
        self.cursor
            .with_current(|row| row.key.clone())
            .unwrap_or(Bson::Null)
    }

    /// Value of the current row, or `Null`.
    pub fn value(&self) -> Bson {
        self.cursor
            .with_current(|row| row.value.clone())
            .unwrap_or(Bson::Null)
    }

    /// Document of the current row, if the backend included it.
    pub fn doc(&self) -> Option<Document> {
        self.cursor
            .with_current(|row| row.doc.clone())
            .flatten()
    }

    /// Decodes the document of the current row into `T`.
    ///
    /// # Errors
    ///
    /// Returns a bad-request error if no document is available for the current row.
    pub fn scan_doc<T: DeserializeOwned>(&self) -> DocumentStoreResult<T> {
        let document = self.doc().ok_or_else(|| {
            DocumentStoreError::BadRequest("no document on the current row".into())
        })?;

        from_document(document)
    }

    /// The current row as a whole.
    pub fn current(&self) -> Option<Row> {
        self.cursor.current()
    }

    /// Error that ended the iteration, if any.
    pub fn err(&self) -> Option<DocumentStoreError> {
        self.cursor.err()
    }

    /// Lifecycle phase of the underlying cursor.
    pub fn phase(&self) -> CursorPhase {
        self.cursor.phase()
    }

    /// Closes the rows and ends the read operation. Idempotent.
    pub async fn close(&self) -> DocumentStoreResult<()> {
        self.cursor.close().await
    }

    /// Unwraps the generic cursor.
    pub fn into_cursor(self) -> Cursor<Row> {
        self.cursor
    }
}
