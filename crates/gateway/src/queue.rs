//! Bounded outbound queue for sends issued while the socket is not open.

use std::collections::VecDeque;

/// FIFO of pre-serialised envelopes with a drop-oldest overflow policy.
#[derive(Debug)]
pub(crate) struct OutboundQueue {
    items: VecDeque<String>,
    capacity: usize,
}

impl OutboundQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Appends an envelope, evicting and returning the oldest one when full.
    pub(crate) fn push(&mut self, envelope: String) -> Option<String> {
        let dropped = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(envelope);
        dropped
    }

    /// Removes every queued envelope in enqueue order.
    pub(crate) fn drain(&mut self) -> Vec<String> {
        self.items.drain(..).collect()
    }

    /// Puts envelopes back at the front, ahead of anything queued since,
    /// keeping their order. Returns how many of the oldest were dropped to
    /// stay within capacity.
    pub(crate) fn restore(&mut self, envelopes: Vec<String>) -> usize {
        for envelope in envelopes.into_iter().rev() {
            self.items.push_front(envelope);
        }
        let excess = self.items.len().saturating_sub(self.capacity);
        self.items.drain(..excess);
        excess
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }
}
