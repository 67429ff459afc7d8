use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::domain::{Batch, Event};

/// In-memory buffer shared by the ingest handler and the flush coordinator.
///
/// Appends and drains take the same lock, so every event lands in exactly one
/// batch. The buffer is swapped for a fresh one pre-sized to the threshold on
/// every drain.
pub struct PayloadStore {
    events: Mutex<Vec<Event>>,
    threshold: usize,
    threshold_hit: Notify,
}

impl PayloadStore {
    pub fn new(threshold: usize) -> Self {
        Self {
            events: Mutex::new(Vec::with_capacity(threshold)),
            threshold,
            threshold_hit: Notify::new(),
        }
    }

    /// Buffers one event and returns the number of events now held.
    pub fn append(&self, event: Event) -> usize {
        let len = {
            let mut events = self.lock();
            events.push(event);
            events.len()
        };
        if len >= self.threshold {
            self.threshold_hit.notify_one();
        }
        len
    }

    /// Removes and returns everything buffered, in receipt order.
    pub fn drain_all(&self) -> Batch {
        let mut events = self.lock();
        std::mem::replace(&mut *events, Vec::with_capacity(self.threshold))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Resolves once an append has brought the buffer to the threshold.
    ///
    /// A crossing that happens while nobody is waiting is remembered, so the
    /// next call returns immediately. Callers must re-check `len()`: the
    /// events may already have been drained by another trigger.
    pub async fn threshold_reached(&self) {
        self.threshold_hit.notified().await;
    }

    // Poison is ignored.
    fn lock(&self) -> MutexGuard<'_, Vec<Event>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
