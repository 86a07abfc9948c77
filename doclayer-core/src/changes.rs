//! Cursor over a collection's changes feed.

use bson::Document;

use crate::{
    backend::Change,
    error::{DocumentStoreError, DocumentStoreResult},
    iter::{Cursor, CursorPhase},
};

#[derive(Debug)]
pub struct Changes {
    cursor: Cursor<Change>,
}

impl Changes {
    pub(crate) fn new(cursor: Cursor<Change>) -> Self {
        Self { cursor }
    }

    /// Moves to the next change. Returns `false` once the feed ends or fails.
    pub async fn advance(&self) -> bool {
        self.cursor.advance().await
    }

    /// Document ID of the current change, or an empty string.
    pub fn id(&self) -> String {
        self.cursor
            .with_current(|change| change.id.clone())
            .unwrap_or_default()
    }

    /// Sequence token of the current change; pass it as `since` to resume the feed.
    pub fn seq(&self) -> String {
        self.cursor
            .with_current(|change| change.seq.clone())
            .unwrap_or_default()
    }

    /// Whether the current change deleted its document.
    pub fn deleted(&self) -> bool {
        self.cursor
            .with_current(|change| change.deleted)
            .unwrap_or_default()
    }

    /// Leaf revisions of the current change.
    pub fn changes(&self) -> Vec<String> {
        self.cursor
            .with_current(|change| change.changes.clone())
            .unwrap_or_default()
    }

    /// Document of the current change, if the backend included it.
    pub fn doc(&self) -> Option<Document> {
        self.cursor
            .with_current(|change| change.doc.clone())
            .flatten()
    }

    /// The current change as a whole.
    pub fn current(&self) -> Option<Change> {
        self.cursor.current()
    }

    /// Error that ended the feed, if any.
    pub fn err(&self) -> Option<DocumentStoreError> {
        self.cursor.err()
    }

    /// Lifecycle phase of the underlying cursor.
    pub fn phase(&self) -> CursorPhase {
        self.cursor.phase()
    }

    /// Closes the feed and ends the read operation. Idempotent.
    pub async fn close(&self) -> DocumentStoreResult<()> {
        self.cursor.close().await
    }

    /// Unwraps the generic cursor.
    pub fn into_cursor(self) -> Cursor<Change> {
        self.cursor
    }
}
