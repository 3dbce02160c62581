//! Work queue connecting two pipeline stages
//!
//! An unbounded multi-producer/multi-consumer FIFO with "join" semantics:
//! every `put` increments an outstanding-item counter, every `task_done`
//! (or `release`) decrements it, and `join` resolves once the counter is
//! back to zero. Items enqueued while a join is pending keep it pending.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

struct Inner<T> {
    name: &'static str,
    items: Mutex<VecDeque<T>>,
    item_ready: Notify,
    outstanding: AtomicUsize,
    drained: Notify,
    completed: AtomicUsize,
    released: AtomicUsize,
}

/// Cloneable handle to a shared work queue
pub struct WorkQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> WorkQueue<T> {
    /// Creates an empty queue; `name` only appears in log events
    pub fn new(name: &'static str) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                items: Mutex::new(VecDeque::new()),
                item_ready: Notify::new(),
                outstanding: AtomicUsize::new(0),
                drained: Notify::new(),
                completed: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Appends an item and wakes one waiting consumer
    pub fn put(&self, item: T) {
        self.inner.outstanding.fetch_add(1, Ordering::SeqCst);
        self.items().push_back(item);
        self.inner.item_ready.notify_one();
    }

    /// Removes the next item without waiting
    pub fn try_get(&self) -> Option<T> {
        let mut items = self.items();
        let item = items.pop_front();
        // Hand the wakeup on if more work is waiting
        if item.is_some() && !items.is_empty() {
            self.inner.item_ready.notify_one();
        }
        item
    }

    /// Waits for the next item
    ///
    /// Returns None once `cancel` fires; an empty queue alone never ends
    /// the wait.
    pub async fn get(&self, cancel: &CancellationToken) -> Option<T> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            if let Some(item) = self.try_get() {
                return Some(item);
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                _ = self.inner.item_ready.notified() => {}
            }
        }
    }

    /// Acknowledges one item as fully processed
    pub fn task_done(&self) {
        self.inner.completed.fetch_add(1, Ordering::SeqCst);
        self.acknowledge();
    }

    /// Gives up on one item without counting it as processed
    ///
    /// The item no longer blocks `join`, but it is reported by `released`
    /// rather than `completed`; its durable state is left for a later run.
    pub fn release(&self) {
        self.inner.released.fetch_add(1, Ordering::SeqCst);
        self.acknowledge();
    }

    fn acknowledge(&self) {
        let previous =
            self.inner
                .outstanding
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                    count.checked_sub(1)
                });

        match previous {
            Ok(1) => self.inner.drained.notify_waiters(),
            Ok(_) => {}
            Err(_) => tracing::warn!(
                queue = self.inner.name,
                "Item acknowledged more times than it was queued"
            ),
        }
    }

    /// Waits until every queued item has been acknowledged
    ///
    /// Returns false if `cancel` fired first.
    pub async fn join(&self, cancel: &CancellationToken) -> bool {
        loop {
            let notified = self.inner.drained.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent final ack is not missed
            notified.as_mut().enable();

            if self.inner.outstanding.load(Ordering::SeqCst) == 0 {
                return true;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return false,
                _ = &mut notified => {}
            }
        }
    }

    /// Items put but not yet acknowledged (queued or in progress)
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::SeqCst)
    }

    /// Items acknowledged with `task_done`
    pub fn completed(&self) -> usize {
        self.inner.completed.load(Ordering::SeqCst)
    }

    /// Items acknowledged with `release`
    pub fn released(&self) -> usize {
        self.inner.released.load(Ordering::SeqCst)
    }

    /// Items waiting to be taken
    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    fn items(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.inner
            .items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
