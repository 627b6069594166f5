//! Blocking multi-producer, multi-consumer queue of file paths.

use std::collections::VecDeque;
use std::pin::pin;
use std::sync::{Arc, Weak};

use parking_lot::{Condvar, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::QueueError;
use crate::Result;

/// Thread-safe FIFO of file paths with blocking, cancelable dequeue.
///
/// Each path is handed to exactly one consumer. The cancellation token
/// given at construction governs every blocking call: once it fires, all
/// parked consumers wake and every later dequeue returns `None` without
/// blocking. Cancellation is an outcome, not an error.
///
/// Clone is cheap - clones share the same queue.
#[derive(Clone)]
pub struct FileQueue {
    shared: Arc<Shared>,
}

struct Shared {
    items: Mutex<VecDeque<String>>,
    available: Condvar,
    cancel: CancellationToken,
    closed: CancellationToken,
}

impl Drop for Shared {
    fn drop(&mut self) {
        // Releases the cancellation listener thread.
        self.closed.cancel();
    }
}

impl FileQueue {
    /// Create an empty queue bound to `cancel`.
    ///
    /// A small listener thread turns cancellation of the token into a
    /// wake-up of every parked consumer.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener thread cannot be spawned.
    pub fn new(cancel: CancellationToken) -> Result<Self> {
        let shared = Arc::new(Shared {
            items: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            cancel: cancel.clone(),
            closed: CancellationToken::new(),
        });

        let weak = Arc::downgrade(&shared);
        let closed = shared.closed.clone();
        std::thread::Builder::new()
            .name("file-queue-cancel".to_string())
            .spawn(move || wake_on_cancel(&cancel, &closed, &weak))
            .map_err(|e| QueueError::Spawn(e.to_string()))?;

        Ok(Self { shared })
    }

    /// Append `path` to the tail. Never blocks and never fails.
    pub fn enqueue(&self, path: impl Into<String>) {
        self.shared.items.lock().push_back(path.into());
        self.shared.available.notify_one();
    }

    /// Take the head, blocking until a path is available.
    ///
    /// Returns `None` once the queue's token is cancelled, whether that
    /// happened before the call or while it was parked.
    #[must_use]
    pub fn dequeue(&self) -> Option<String> {
        let mut items = self.shared.items.lock();
        loop {
            if self.shared.cancel.is_cancelled() {
                return None;
            }
            if let Some(path) = items.pop_front() {
                return Some(path);
            }
            self.shared.available.wait(&mut items);
        }
    }

    /// Take the head if one is immediately available.
    #[must_use]
    pub fn try_dequeue(&self) -> Option<String> {
        if self.shared.cancel.is_cancelled() {
            return None;
        }
        self.shared.items.lock().pop_front()
    }

    /// Look at the head without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<String> {
        if self.shared.cancel.is_cancelled() {
            return None;
        }
        self.shared.items.lock().front().cloned()
    }

    /// Remove the first pending occurrence of `path`.
    pub fn remove(&self, path: &str) -> bool {
        let mut items = self.shared.items.lock();
        items
            .iter()
            .position(|p| p == path)
            .and_then(|idx| items.remove(idx))
            .is_some()
    }

    /// Whether `path` is pending.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.shared.items.lock().iter().any(|p| p == path)
    }

    /// Number of pending paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.items.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.items.lock().is_empty()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Iterator that blocks for each path and ends on cancellation.
    #[must_use]
    pub fn blocking_iter(&self) -> BlockingIter<'_> {
        BlockingIter { queue: self }
    }
}

impl std::fmt::Debug for FileQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileQueue")
            .field("len", &self.len())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Blocking iterator over a [`FileQueue`], see [`FileQueue::blocking_iter`].
#[derive(Debug)]
pub struct BlockingIter<'a> {
    queue: &'a FileQueue,
}

impl Iterator for BlockingIter<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.queue.dequeue()
    }
}

/// Park until the token fires or the queue goes away, then wake every
/// consumer. Notifying under the lock pairs with the cancellation check
/// consumers make under the same lock, so no wake-up is lost.
fn wake_on_cancel(cancel: &CancellationToken, closed: &CancellationToken, queue: &Weak<Shared>) {
    let cancelled = pin!(cancel.cancelled());
    let dropped = pin!(closed.cancelled());
    futures::executor::block_on(futures::future::select(cancelled, dropped));

    if let Some(shared) = queue.upgrade() {
        let _items = shared.items.lock();
        shared.available.notify_all();
        tracing::debug!("File queue cancelled, consumers released");
    }
}
