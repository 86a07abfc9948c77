//! Bookkeeping of in-flight operations on a handle.
//!
//! Each store and collection handle counts the operations running against it. Closing
//! a handle refuses new operations and waits for the running ones, including open
//! cursors, to finish.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use tokio::sync::Notify;

#[derive(Debug, Default)]
pub(crate) struct OperationTracker {
    closed: AtomicBool,
    active: AtomicUsize,
    idle: Notify,
}

impl OperationTracker {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers an operation, or returns `None` if the handle is closed.
    pub(crate) fn start(self: &Arc<Self>) -> Option<OperationGuard> {
        self.active.fetch_add(1, Ordering::SeqCst);
        let guard = OperationGuard {
            tracker: self.clone(),
        };

        if self.closed.load(Ordering::SeqCst) {
            return None;
        }

        Some(guard)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Refuses new operations and waits until the running ones finish.
    pub(crate) async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);

        loop {
            let idle = self.idle.notified();
            if self.active.load(Ordering::SeqCst) == 0 {
                return;
            }
            idle.await;
        }
    }
}

/// Marks one running operation; dropping it ends the operation.
#[derive(Debug)]
pub(crate) struct OperationGuard {
    tracker: Arc<OperationTracker>,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        if self.tracker.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.tracker.idle.notify_waiters();
        }
    }
}
