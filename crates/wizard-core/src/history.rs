//! Bounded history of finished conversations
//!
//! A fixed-capacity ring: slots are allocated once, the write position wraps
//! around, and when the ring is full the oldest log is overwritten. Logs are
//! held as `Arc` so snapshots share them without handing out mutable access.
//!
//! The only mutations are `append` and `clear`; entries are never reordered
//! or removed one at a time.

use std::num::NonZeroUsize;
use std::ops::Deref;
use std::sync::Arc;

use crate::conversation::ConversationLog;

/// Fixed-capacity FIFO ring of conversation logs
#[derive(Debug)]
pub struct HistoryBuffer {
    slots: Box<[Option<Arc<ConversationLog>>]>,
    /// Slot holding the oldest log
    head: usize,
    len: usize,
}

impl HistoryBuffer {
    /// Create a buffer holding at most `capacity` logs.
    ///
    /// # Panics
    ///
    /// Panics if capacity is 0.
    pub fn new(capacity: usize) -> Self {
        match NonZeroUsize::new(capacity) {
            Some(capacity) => Self::with_capacity(capacity),
            None => panic!("HistoryBuffer capacity must be > 0"),
        }
    }

    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            slots: (0..capacity.get()).map(|_| None).collect(),
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Add a log at the tail, evicting the oldest when full
    pub fn append(&mut self, log: impl Into<Arc<ConversationLog>>) {
        let capacity = self.capacity();
        let tail = (self.head + self.len) % capacity;
        self.slots[tail] = Some(log.into());

        if self.len == capacity {
            // Tail landed on the oldest slot
            self.head = (self.head + 1) % capacity;
        } else {
            self.len += 1;
        }
    }

    /// Current contents, oldest first
    pub fn snapshot(&self) -> HistorySnapshot {
        let capacity = self.capacity();
        let logs = (0..self.len)
            .filter_map(|i| self.slots[(self.head + i) % capacity].clone())
            .collect();
        HistorySnapshot { logs }
    }

    /// Empty the buffer
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.head = 0;
        self.len = 0;
    }
}

/// Immutable, oldest-first view of the buffer at one point in time
#[derive(Debug, Clone, Default)]
pub struct HistorySnapshot {
    logs: Vec<Arc<ConversationLog>>,
}

impl HistorySnapshot {
    /// Iterate the logs, oldest first
    pub fn logs(&self) -> impl Iterator<Item = &ConversationLog> {
        self.logs.iter().map(|l| l.as_ref())
    }
}

impl Deref for HistorySnapshot {
    type Target = [Arc<ConversationLog>];

    fn deref(&self) -> &Self::Target {
        &self.logs
    }
}
