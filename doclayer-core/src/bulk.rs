//! Multi-document writes.
//!
//! [`Collection::bulk_docs`] hands the whole document set to the backend when it
//! implements [`BulkDocer`](crate::backend::BulkDocer). Otherwise it writes the
//! documents one at a time and replays the outcomes through the same cursor type, so
//! callers cannot tell the two paths apart: one [`BulkResult`] per document, in
//! submission order, with per-document failures reported through
//! [`BulkResults::update_err`].

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    TRACING_TARGET_BULK,
    backend::{BulkResult, ResultProducer, StoreBackend},
    collection::Collection,
    document::{DocumentInput, document_id},
    error::{DocumentStoreError, DocumentStoreResult},
    iter::{Cursor, CursorPhase},
    options::Options,
};

/// Cursor over the results of a bulk write.
#[derive(Debug)]
pub struct BulkResults {
    cursor: Cursor<BulkResult>,
}

impl BulkResults {
    pub(crate) fn new(cursor: Cursor<BulkResult>) -> Self {
        Self { cursor }
    }

    /// Moves to the next result. Returns `false` when there are no more results or
    /// iteration failed.
    pub async fn advance(&self) -> bool {
        self.cursor.advance().await
    }

    /// Document ID of the current result, or an empty string.
    pub fn id(&self) -> String {
        self.cursor
            .with_current(|result| result.id.clone())
            .unwrap_or_default()
    }

    /// Revision of the current result, or an empty string.
    pub fn rev(&self) -> String {
        self.cursor
            .with_current(|result| result.rev.clone())
            .unwrap_or_default()
    }

    /// Error of the current result, if writing that document failed.
    ///
    /// Not to be confused with [`BulkResults::err`], which reports a failure of the
    /// iteration itself.
    pub fn update_err(&self) -> Option<DocumentStoreError> {
        self.cursor
            .with_current(|result| result.error.clone())
            .flatten()
    }

    /// The current result as a whole.
    pub fn current(&self) -> Option<BulkResult> {
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

    /// Closes the results and ends the bulk operation. Idempotent.
    pub async fn close(&self) -> DocumentStoreResult<()> {
        self.cursor.close().await
    }

    /// Drains the remaining results.
    ///
    /// # Errors
    ///
    /// Returns the iteration error, if any. Per-document errors stay inside the results.
    pub async fn collect(self) -> DocumentStoreResult<Vec<BulkResult>> {
        let mut results = Vec::new();
        while self.cursor.advance().await {
            if let Some(result) = self.cursor.current() {
                results.push(result);
            }
        }

        if let Some(err) = self.cursor.err() {
            return Err(err);
        }
        self.cursor.close().await?;

        Ok(results)
    }

    /// Unwraps the generic cursor, e.g. for [`Cursor::into_stream`].
    pub fn into_cursor(self) -> Cursor<BulkResult> {
        self.cursor
    }
}

/// Results of an emulated bulk write, consumed from the front.
///
/// An interrupted write yields its error after the completed results.
#[derive(Debug, Default)]
struct EmulatedBulkResults {
    results: VecDeque<BulkResult>,
    interrupted: Option<DocumentStoreError>,
}

#[async_trait]
impl ResultProducer<BulkResult> for EmulatedBulkResults {
    async fn next(&mut self) -> DocumentStoreResult<Option<BulkResult>> {
        match self.results.pop_front() {
            Some(result) => Ok(Some(result)),
            None => match self.interrupted.take() {
                Some(err) => Err(err),
                None => Ok(None),
            },
        }
    }

    async fn close(&mut self) -> DocumentStoreResult<()> {
        self.results.clear();
        self.interrupted = None;
        Ok(())
    }
}

impl<'a, B: StoreBackend + ?Sized> Collection<'a, B> {
    /// Creates and updates several documents at once.
    ///
    /// Each document may be any [`DocumentInput`]. Documents carrying an `_id` are
    /// written under that identifier, the others get a generated one.
    ///
    /// # Errors
    ///
    /// Fails before writing anything if `documents` is empty or any document cannot be
    /// normalized. Fails as a whole if the backend rejects a native bulk write, or if
    /// `cancel` fires before the backend answers it. Failures of single documents
    /// are reported through [`BulkResults::update_err`] instead.
    ///
    /// When `cancel` fires while documents are written one at a time, the results of
    /// the completed writes are still returned. The cursor then ends with
    /// [`DocumentStoreError::Cancelled`] as its sticky error.
    pub async fn bulk_docs<I>(
        &self,
        cancel: &CancellationToken,
        documents: I,
        options: impl Into<Options>,
    ) -> DocumentStoreResult<BulkResults>
    where
        I: IntoIterator,
        I::Item: Into<DocumentInput>,
    {
        let documents = documents
            .into_iter()
            .map(|document| document.into().normalize())
            .collect::<DocumentStoreResult<Vec<_>>>()
            .map_err(|err| match err {
                DocumentStoreError::InvalidDocument(_) | DocumentStoreError::BadRequest(_) => err,
                other => DocumentStoreError::BadRequest(other.to_string()),
            })?;

        if documents.is_empty() {
            return Err(DocumentStoreError::NoDocuments);
        }

        let op = self.start_operation()?;
        let options = options.into();

        if let Some(bulk_docer) = self.backend().bulk_docer() {
            tracing::debug!(
                target: TRACING_TARGET_BULK,
                collection = %self.name(),
                documents = documents.len(),
                "Delegating bulk write to backend"
            );

            let producer = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(DocumentStoreError::Cancelled),
                result = bulk_docer.bulk_docs(self.name(), documents, &options) => result,
            }
            .inspect_err(|err| {
                tracing::error!(
                    target: TRACING_TARGET_BULK,
                    collection = %self.name(),
                    error = %err,
                    "Bulk write failed"
                );
            })?;

            return Ok(BulkResults::new(Cursor::new(
                cancel,
                producer,
                Some(op.into_release()),
            )));
        }

        tracing::debug!(
            target: TRACING_TARGET_BULK,
            collection = %self.name(),
            documents = documents.len(),
            "Emulating bulk write with single document writes"
        );

        let total = documents.len();
        let mut results = VecDeque::with_capacity(total);
        let mut interrupted = None;

        for document in documents {
            let id = document_id(&document).map(str::to_string);

            let write = async {
                match id.as_deref() {
                    Some(id) => self
                        .put_document(id, document, &options)
                        .await
                        .map(|rev| (id.to_string(), rev)),
                    None => self.create_document(document, &options).await,
                }
            };

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                outcome = write => Some(outcome),
            };
            let Some(outcome) = outcome else {
                tracing::warn!(
                    target: TRACING_TARGET_BULK,
                    collection = %self.name(),
                    written = results.len(),
                    total,
                    "Bulk write cancelled"
                );
                interrupted = Some(DocumentStoreError::Cancelled);
                break;
            };

            let result = match outcome {
                Ok((id, rev)) => BulkResult::ok(id, rev),
                Err(err) => {
                    tracing::warn!(
                        target: TRACING_TARGET_BULK,
                        collection = %self.name(),
                        id = id.as_deref().unwrap_or_default(),
                        error = %err,
                        "Document write failed"
                    );
                    BulkResult::failed(id.unwrap_or_default(), err)
                }
            };
            results.push_back(result);
        }

        // A fired token would end the replay before the completed results.
        let replay_cancel = if interrupted.is_some() {
            CancellationToken::new()
        } else {
            cancel.clone()
        };

        Ok(BulkResults::new(Cursor::new(
            &replay_cancel,
            Box::new(EmulatedBulkResults {
                results,
                interrupted,
            }),
            Some(op.into_release()),
        )))
    }
}
