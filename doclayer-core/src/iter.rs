//! The generic cursor every multi-row operation is built on.
//!
//! A [`Cursor`] owns one [`ResultProducer`] and exposes it through a uniform
//! lifecycle: it starts out ready, each successful [`Cursor::advance`] positions it on
//! a new item, and it ends exhausted, errored, or closed. The typed result sets
//! ([`BulkResults`](crate::bulk::BulkResults), [`Rows`](crate::rows::Rows),
//! [`Changes`](crate::changes::Changes)) are thin views over a cursor.
//!
//! # Locking
//!
//! The cursor state (current item, phase, terminal error) lives behind a read-write
//! lock. Accessors take the shared side only for as long as it takes to copy a field
//! out, so they never wait on backend I/O. The producer sits behind a separate async
//! mutex held by `advance` and `close`; only `advance` ever awaits the backend.
//!
//! # Release
//!
//! A cursor is created with an optional release callback. Whichever comes first of
//! exhaustion, error, [`Cursor::close`], or dropping the cursor fires it; every other
//! path finds it already taken.

use std::fmt;

use futures::stream::{self, Stream};
use mea::mutex::Mutex;
use parking_lot::{Mutex as SyncMutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::{
    TRACING_TARGET_CURSOR,
    backend::BoxProducer,
    error::{DocumentStoreError, DocumentStoreResult},
};

/// Callback fired exactly once when a cursor terminates.
pub type ReleaseFn = Box<dyn FnOnce() + Send>;

/// Lifecycle phase of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorPhase {
    /// Created, never advanced.
    Ready,
    /// Holding a current item.
    Positioned,
    /// The producer ran out of items.
    Exhausted,
    /// The producer failed or the caller cancelled; see [`Cursor::err`].
    Errored,
    /// Closed explicitly before reaching another terminal phase.
    Closed,
}

impl CursorPhase {
    /// Whether the cursor has ended and will not advance again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CursorPhase::Exhausted | CursorPhase::Errored | CursorPhase::Closed
        )
    }
}

struct CursorState<T> {
    current: Option<T>,
    phase: CursorPhase,
    err: Option<DocumentStoreError>,
}

/// A concurrency-safe, cancellable cursor over the items of one producer.
///
/// `advance` and `close` take `&self`, so a cursor shared behind an `Arc` can be
/// closed from one task while another is advancing it. Only one `advance` should run
/// at a time; concurrent calls are serialized.
pub struct Cursor<T: Send + 'static> {
    state: RwLock<CursorState<T>>,
    producer: Mutex<Option<BoxProducer<T>>>,
    cancel: CancellationToken,
    closing: CancellationToken,
    release: SyncMutex<Option<ReleaseFn>>,
}

impl<T: Send + 'static> Cursor<T> {
    /// Binds a cursor to `producer`.
    ///
    /// Cancelling `cancel` makes a pending or later `advance` give up with
    /// [`DocumentStoreError::Cancelled`].
    pub fn new(cancel: &CancellationToken, producer: BoxProducer<T>, release: Option<ReleaseFn>) -> Self {
        Self {
            state: RwLock::new(CursorState {
                current: None,
                phase: CursorPhase::Ready,
                err: None,
            }),
            producer: Mutex::new(Some(producer)),
            cancel: cancel.clone(),
            closing: cancel.child_token(),
            release: SyncMutex::new(release),
        }
    }

    /// Moves to the next item.
    ///
    /// Returns `true` when an item is positioned. Returns `false` once the cursor is
    /// exhausted, errored, or closed; check [`Cursor::err`] to tell a clean end from a
    /// failure.
    pub async fn advance(&self) -> bool {
        if self.state.read().phase.is_terminal() {
            return false;
        }

        let mut producer = self.producer.lock().await;
        let Some(feed) = producer.as_mut() else {
            return false;
        };

        let fetched = tokio::select! {
            biased;
            _ = self.closing.cancelled() => None,
            result = feed.next() => Some(result),
        };

        match fetched {
            Some(Ok(Some(item))) => {
                let mut state = self.state.write();
                state.current = Some(item);
                state.phase = CursorPhase::Positioned;
                true
            }
            Some(Ok(None)) => {
                self.terminate(&mut producer, CursorPhase::Exhausted, None)
                    .await;
                false
            }
            Some(Err(err)) => {
                tracing::debug!(
                    target: TRACING_TARGET_CURSOR,
                    error = %err,
                    "Cursor producer failed"
                );
                self.terminate(&mut producer, CursorPhase::Errored, Some(err))
                    .await;
                false
            }
            None if self.cancel.is_cancelled() => {
                tracing::debug!(target: TRACING_TARGET_CURSOR, "Cursor cancelled");
                self.terminate(
                    &mut producer,
                    CursorPhase::Errored,
                    Some(DocumentStoreError::Cancelled),
                )
                .await;
                false
            }
            // Closed from another task; `close` finishes the release.
            None => false,
        }
    }

    /// Returns the terminal error, or `None` if iteration has not failed.
    ///
    /// Exhaustion is not an error.
    pub fn err(&self) -> Option<DocumentStoreError> {
        self.state.read().err.clone()
    }

    /// Returns the lifecycle phase the cursor is in.
    pub fn phase(&self) -> CursorPhase {
        self.state.read().phase
    }

    /// Runs `f` against the positioned item, or returns `None` if there is none.
    pub fn with_current<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let state = self.state.read();
        match state.phase {
            CursorPhase::Positioned => state.current.as_ref().map(f),
            _ => None,
        }
    }

    /// Returns a copy of the positioned item.
    pub fn current(&self) -> Option<T>
    where
        T: Clone,
    {
        self.with_current(T::clone)
    }

    fn take_current(&self) -> Option<T> {
        self.state.write().current.take()
    }

    /// Closes the cursor, releasing the producer and firing the release callback.
    ///
    /// Closing is idempotent. An `advance` running concurrently stops waiting on the
    /// producer and returns `false`.
    ///
    /// # Errors
    ///
    /// Returns the producer's close error, on the call that actually closed it.
    pub async fn close(&self) -> DocumentStoreResult<()> {
        self.closing.cancel();

        let mut producer = self.producer.lock().await;
        match self
            .terminate(&mut producer, CursorPhase::Closed, None)
            .await
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Single exit path shared by exhaustion, failure, and explicit close.
    ///
    /// Returns the producer's close error. When the cursor ends on its own, that error
    /// also becomes the sticky error unless one is already set.
    async fn terminate(
        &self,
        producer: &mut Option<BoxProducer<T>>,
        phase: CursorPhase,
        err: Option<DocumentStoreError>,
    ) -> Option<DocumentStoreError> {
        {
            let mut state = self.state.write();
            state.current = None;
            if state.err.is_none() {
                state.err = err;
            }
            if phase == CursorPhase::Closed || !state.phase.is_terminal() {
                state.phase = phase;
            }
        }

        let close_err = match producer.take() {
            Some(mut feed) => feed.close().await.err(),
            None => None,
        };

        if let Some(close_err) = &close_err {
            tracing::debug!(
                target: TRACING_TARGET_CURSOR,
                error = %close_err,
                "Failed to close cursor producer"
            );

            if phase != CursorPhase::Closed {
                let mut state = self.state.write();
                if state.err.is_none() {
                    state.err = Some(close_err.clone());
                    state.phase = CursorPhase::Errored;
                }
            }
        }

        self.release();
        close_err
    }

    fn release(&self) {
        let release = self.release.lock().take();
        if let Some(release) = release {
            release();
        }
    }

    /// Converts the cursor into a stream of items.
    ///
    /// The stream ends after the last item, yielding the terminal error first if
    /// iteration failed. The cursor is closed when the stream ends.
    pub fn into_stream(self) -> impl Stream<Item = DocumentStoreResult<T>> {
        stream::unfold(Some(self), |cursor| async move {
            let Some(cursor) = cursor else {
                return None;
            };

            if cursor.advance().await {
                let Some(item) = cursor.take_current() else {
                    return None;
                };
                return Some((Ok(item), Some(cursor)));
            }

            match cursor.err() {
                Some(err) => {
                    if let Err(close_err) = cursor.close().await {
                        tracing::debug!(
                            target: TRACING_TARGET_CURSOR,
                            error = %close_err,
                            "Failed to close cursor after error"
                        );
                    }
                    Some((Err(err), None))
                }
                None => cursor
                    .close()
                    .await
                    .err()
                    .map(|err| (Err(err), None)),
            }
        })
    }
}

impl<T: Send + 'static> Drop for Cursor<T> {
    fn drop(&mut self) {
        self.closing.cancel();
        if let Some(release) = self.release.get_mut().take() {
            release();
        }
    }
}

impl<T: Send + 'static> fmt::Debug for Cursor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Cursor")
            .field("phase", &state.phase)
            .field("err", &state.err)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use futures::{StreamExt, future};

    use super::*;
    use crate::backend::ResultProducer;

    /// Test producer yielding scripted results, optionally hanging once they run out.
    pub(crate) struct ScriptedProducer {
        pub items: VecDeque<DocumentStoreResult<u32>>,
        pub hang_when_empty: bool,
        pub close_err: Option<DocumentStoreError>,
        pub closes: Arc<AtomicUsize>,
    }

    impl ScriptedProducer {
        pub(crate) fn new(items: Vec<DocumentStoreResult<u32>>) -> (Self, Arc<AtomicUsize>) {
            let closes = Arc::new(AtomicUsize::new(0));
            let producer = Self {
                items: items.into(),
                hang_when_empty: false,
                close_err: None,
                closes: closes.clone(),
            };
            (producer, closes)
        }
    }

    #[async_trait]
    impl ResultProducer<u32> for ScriptedProducer {
        async fn next(&mut self) -> DocumentStoreResult<Option<u32>> {
            match self.items.pop_front() {
                Some(item) => item.map(Some),
                None if self.hang_when_empty => future::pending().await,
                None => Ok(None),
            }
        }

        async fn close(&mut self) -> DocumentStoreResult<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            match self.close_err.take() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    fn counting_release() -> (ReleaseFn, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = count.clone();
        let release: ReleaseFn = Box::new(move || {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        (release, count)
    }

    #[tokio::test]
    async fn test_iterates_until_exhausted() {
        let (producer, closes) = ScriptedProducer::new(vec![Ok(1), Ok(2)]);
        let (release, released) = counting_release();
        let cursor = Cursor::new(&CancellationToken::new(), Box::new(producer), Some(release));

        assert_eq!(cursor.phase(), CursorPhase::Ready);
        assert_eq!(cursor.current(), None);

        assert!(cursor.advance().await);
        assert_eq!(cursor.current(), Some(1));
        assert!(cursor.advance().await);
        assert_eq!(cursor.current(), Some(2));
        assert!(!cursor.advance().await);

        assert_eq!(cursor.phase(), CursorPhase::Exhausted);
        assert_eq!(cursor.current(), None);
        assert_eq!(cursor.err(), None);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(released.load(Ordering::SeqCst), 1);

        cursor.close().await.unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_error_is_sticky() {
        let (producer, _) = ScriptedProducer::new(vec![
            Ok(1),
            Err(DocumentStoreError::backend(502, "upstream")),
            Ok(3),
        ]);
        let (release, released) = counting_release();
        let cursor = Cursor::new(&CancellationToken::new(), Box::new(producer), Some(release));

        assert!(cursor.advance().await);
        assert!(!cursor.advance().await);
        assert_eq!(cursor.phase(), CursorPhase::Errored);
        assert_eq!(cursor.current(), None);

        let err = cursor.err().unwrap();
        assert_eq!(err.status(), Some(502));
        assert!(!cursor.advance().await);
        assert_eq!(cursor.err(), Some(err));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_before_advance() {
        let (producer, closes) = ScriptedProducer::new(vec![Ok(1)]);
        let (release, released) = counting_release();
        let cursor = Cursor::new(&CancellationToken::new(), Box::new(producer), Some(release));

        cursor.close().await.unwrap();
        cursor.close().await.unwrap();

        assert!(!cursor.advance().await);
        assert_eq!(cursor.phase(), CursorPhase::Closed);
        assert_eq!(cursor.err(), None);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_close_releases_once() {
        let (producer, closes) = ScriptedProducer::new(vec![Ok(1), Ok(2)]);
        let (release, released) = counting_release();
        let cursor = Arc::new(Cursor::new(
            &CancellationToken::new(),
            Box::new(producer),
            Some(release),
        ));

        let handles = (0..16)
            .map(|_| {
                let cursor = cursor.clone();
                tokio::spawn(async move { cursor.close().await })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_close_interrupts_pending_advance() {
        let (mut producer, closes) = ScriptedProducer::new(vec![Ok(1)]);
        producer.hang_when_empty = true;
        let (release, released) = counting_release();
        let cursor = Arc::new(Cursor::new(
            &CancellationToken::new(),
            Box::new(producer),
            Some(release),
        ));

        assert!(cursor.advance().await);

        let advancing = {
            let cursor = cursor.clone();
            tokio::spawn(async move { cursor.advance().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        cursor.close().await.unwrap();

        let advanced = tokio::time::timeout(Duration::from_secs(5), advancing)
            .await
            .expect("advance should observe close")
            .unwrap();
        assert!(!advanced);
        assert_eq!(cursor.err(), None);
        assert_eq!(cursor.phase(), CursorPhase::Closed);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancellation_aborts_pending_advance() {
        let (mut producer, closes) = ScriptedProducer::new(vec![]);
        producer.hang_when_empty = true;
        let (release, released) = counting_release();
        let cancel = CancellationToken::new();
        let cursor = Arc::new(Cursor::new(&cancel, Box::new(producer), Some(release)));

        let advancing = {
            let cursor = cursor.clone();
            tokio::spawn(async move { cursor.advance().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let advanced = tokio::time::timeout(Duration::from_secs(5), advancing)
            .await
            .expect("advance should observe cancellation")
            .unwrap();
        assert!(!advanced);
        assert_eq!(cursor.err(), Some(DocumentStoreError::Cancelled));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(released.load(Ordering::SeqCst), 1);

        cursor.close().await.unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_already_cancelled_context() {
        let (producer, _) = ScriptedProducer::new(vec![Ok(1)]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let cursor = Cursor::new(&cancel, Box::new(producer), None);

        assert!(!cursor.advance().await);
        assert_eq!(cursor.err(), Some(DocumentStoreError::Cancelled));
    }

    #[tokio::test]
    async fn test_drop_fires_release() {
        let (producer, _) = ScriptedProducer::new(vec![Ok(1), Ok(2)]);
        let (release, released) = counting_release();
        let cursor = Cursor::new(&CancellationToken::new(), Box::new(producer), Some(release));

        assert!(cursor.advance().await);
        drop(cursor);

        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_into_stream_yields_items_then_error() {
        let (producer, closes) = ScriptedProducer::new(vec![
            Ok(1),
            Ok(2),
            Err(DocumentStoreError::Unknown("lost".into())),
        ]);
        let cursor = Cursor::new(&CancellationToken::new(), Box::new(producer), None);

        let items = cursor.into_stream().collect::<Vec<_>>().await;
        assert_eq!(
            items,
            vec![
                Ok(1),
                Ok(2),
                Err(DocumentStoreError::Unknown("lost".into())),
            ]
        );
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_failure_after_exhaustion_is_sticky() {
        let (mut producer, closes) = ScriptedProducer::new(vec![Ok(1)]);
        producer.close_err = Some(DocumentStoreError::backend(500, "close failed"));
        let (release, released) = counting_release();
        let cursor = Cursor::new(&CancellationToken::new(), Box::new(producer), Some(release));

        assert!(cursor.advance().await);
        assert!(!cursor.advance().await);

        assert_eq!(cursor.phase(), CursorPhase::Errored);
        assert_eq!(cursor.err().and_then(|err| err.status()), Some(500));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(released.load(Ordering::SeqCst), 1);

        cursor.close().await.unwrap();
        assert_eq!(cursor.err().and_then(|err| err.status()), Some(500));
    }

    #[tokio::test]
    async fn test_close_failure_keeps_producer_error() {
        let (mut producer, _) = ScriptedProducer::new(vec![Err(DocumentStoreError::backend(502, "upstream"))]);
        producer.close_err = Some(DocumentStoreError::backend(500, "close failed"));
        let cursor = Cursor::new(&CancellationToken::new(), Box::new(producer), None);

        assert!(!cursor.advance().await);
        assert_eq!(cursor.err().and_then(|err| err.status()), Some(502));
    }

    #[tokio::test]
    async fn test_explicit_close_returns_close_failure() {
        let (mut producer, _) = ScriptedProducer::new(vec![Ok(1)]);
        producer.close_err = Some(DocumentStoreError::backend(500, "close failed"));
        let (release, released) = counting_release();
        let cursor = Cursor::new(&CancellationToken::new(), Box::new(producer), Some(release));

        let err = cursor.close().await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(cursor.err(), None);
        assert_eq!(cursor.phase(), CursorPhase::Closed);
        assert_eq!(released.load(Ordering::SeqCst), 1);

        cursor.close().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_accessors_do_not_wait_on_pending_advance() {
        let (mut producer, _) = ScriptedProducer::new(vec![Ok(7)]);
        producer.hang_when_empty = true;
        let cursor = Arc::new(Cursor::new(&CancellationToken::new(), Box::new(producer), None));

        assert!(cursor.advance().await);

        let advancing = {
            let cursor = cursor.clone();
            tokio::spawn(async move { cursor.advance().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let observed = tokio::time::timeout(Duration::from_millis(200), async {
            (cursor.current(), cursor.phase(), cursor.err())
        })
        .await
        .expect("accessors should not block on the producer");
        assert_eq!(observed, (Some(7), CursorPhase::Positioned, None));
        assert!(!advancing.is_finished());

        cursor.close().await.unwrap();
        assert!(!advancing.await.unwrap());
    }
}
