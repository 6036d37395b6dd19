//! Bounded per-room history of recent broadcast messages.
//!
//! A [`HistoryBuffer`] keeps the most recent messages of one room in arrival
//! order. When the cap is exceeded the oldest message is dropped (FIFO). The
//! buffer has no lock of its own: it lives inside a room and is guarded by
//! that room's mutex, so appends and snapshots are ordered with fan-out.

use std::collections::VecDeque;

use mindware_proto::chat::ChatMessage;

/// Default maximum number of messages retained per room.
pub const DEFAULT_HISTORY_CAPACITY: usize = 200;

/// Ordered, capped log of a room's recent messages.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    messages: VecDeque<ChatMessage>,
    capacity: usize,
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryBuffer {
    /// Creates an empty buffer with the default cap.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Creates an empty buffer holding at most `capacity` messages.
    ///
    /// A zero capacity is clamped to one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            messages: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
            capacity,
        }
    }

    /// Appends a message, evicting the oldest one if the cap is exceeded.
    ///
    /// Returns the buffer length after the append.
    pub fn append(&mut self, message: ChatMessage) -> usize {
        self.messages.push_back(message);
        if self.messages.len() > self.capacity {
            self.messages.pop_front();
        }
        self.messages.len()
    }

    /// Returns every buffered message, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    /// Returns the `n` most recent messages, oldest first.
    #[must_use]
    pub fn latest(&self, n: usize) -> Vec<ChatMessage> {
        let skip = self.messages.len().saturating_sub(n);
        self.messages.iter().skip(skip).cloned().collect()
    }

    /// Number of buffered messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns `true` if nothing has been buffered (or everything evicted).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Maximum number of retained messages.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}
