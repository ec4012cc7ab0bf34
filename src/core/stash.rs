//! # Deferred-replay FIFO for batched workflows.
//!
//! [`StashQueue`] is a secondary queue for events that must be collected now
//! and replayed later in a batch (bulk/visibility workflows). It sits outside
//! the worker pool: stashed events are not dispatched until a module pops
//! them and resubmits through the normal paths.
//!
//! ## Rules
//! - `push` never blocks (unbounded channel).
//! - `pop` is non-blocking and returns `None` when the stash is empty.
//! - Order is strict FIFO across all producers.

use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::events::Event;

/// Unbounded FIFO of stashed events.
pub(crate) struct StashQueue {
    tx: mpsc::UnboundedSender<Event>,
    rx: Mutex<mpsc::UnboundedReceiver<Event>>,
}

impl StashQueue {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Appends an event to the stash.
    pub(crate) fn push(&self, event: Event) {
        // Receiver lives as long as self; send cannot fail.
        let _ = self.tx.send(event);
    }

    /// Pops the oldest stashed event, if any.
    pub(crate) fn pop(&self) -> Option<Event> {
        let mut rx = match self.rx.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_preserved() {
        let stash = StashQueue::new();
        for i in 0..5 {
            stash.push(Event::new("bulk", format!("k{i}")));
        }
        for i in 0..5 {
            assert_eq!(stash.pop().unwrap().key.as_ref(), format!("k{i}"));
        }
        assert!(stash.pop().is_none());
    }

    #[test]
    fn empty_pop_returns_none() {
        let stash = StashQueue::new();
        assert!(stash.pop().is_none());
        stash.push(Event::new("bulk", "k"));
        assert!(stash.pop().is_some());
        assert!(stash.pop().is_none());
    }
}
