//! Bounded staging buffer between validation and storage.
//!
//! Admitted events accumulate here until the configured capacity is reached;
//! the full batch is then swapped out in O(1) and handed to the flush worker
//! while a fresh buffer keeps accepting events. Length never exceeds
//! capacity.

use crate::events::MarketEvent;

pub struct EventBuffer {
    events: Vec<MarketEvent>,
    capacity: usize,
}

impl EventBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append one event. Returns the drained batch when the buffer just
    /// reached capacity, `None` otherwise.
    pub fn push(&mut self, event: MarketEvent) -> Option<Vec<MarketEvent>> {
        self.events.push(event);
        if self.events.len() >= self.capacity {
            Some(self.take())
        } else {
            None
        }
    }

    /// Swap the current contents out, leaving an empty buffer of the same
    /// capacity. Used for partial flushes during shutdown.
    pub fn take(&mut self) -> Vec<MarketEvent> {
        std::mem::replace(&mut self.events, Vec::with_capacity(self.capacity))
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
