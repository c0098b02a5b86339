//! Thread-safe FIFO used to hand messages between connection tasks and the
//! simulation tick.

use parking_lot::Mutex;
use std::collections::VecDeque;

/// Unbounded, mutex-guarded FIFO of opaque items.
///
/// Every operation is non-blocking: producers never wait for consumers and
/// an empty queue is reported rather than awaited.
#[derive(Debug)]
pub struct Queue<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T> Queue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }

    /// Appends an item to the back of the queue
    pub fn enqueue(&self, item: T) {
        self.items.lock().push_back(item);
    }

    /// Removes and returns the oldest item, or None when empty
    pub fn dequeue(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Atomically takes every queued item in FIFO order, leaving the queue empty
    pub fn drain_all(&self) -> Vec<T> {
        let mut items = self.items.lock();
        std::mem::take(&mut *items).into()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}
