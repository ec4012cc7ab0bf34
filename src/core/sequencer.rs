//! # Per-binding-key serialization of events.
//!
//! [`EventSequencer`] enforces at-most-one in-flight serialized event per
//! `(worker, binding_key)` pair. The first serialized event for a key is
//! released immediately and the slot goes busy; later arrivals queue in
//! submission order. Completion (`event_done`) promotes the queue head, or
//! retires the slot when the queue is empty.
//!
//! ## State machine per (worker, binding_key)
//! ```text
//! Idle ── put(first) ──► Busy (event released for dispatch)
//! Busy ── put(next)  ──► Busy (event appended, not released)
//! Busy ── done, queue non-empty ──► Busy (head popped and released)
//! Busy ── done, queue empty     ──► Idle (slot entry removed)
//! ```
//!
//! ## Rules
//! - Only serialized events with a binding key enter the sequencer; anything
//!   else bypasses it entirely, even while same-key events are queued.
//! - A module that never calls `event_done` starves every later serialized
//!   event for that key (head-of-line blocking). That is documented caller
//!   responsibility, not something the sequencer detects.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::events::{Event, WorkerId};

/// Serialization map: `(worker, binding_key) → {in_use, queue}`.
#[derive(Default)]
pub(crate) struct EventSequencer {
    slots: HashMap<(WorkerId, Arc<str>), Slot>,
}

struct Slot {
    in_use: bool,
    queue: VecDeque<Event>,
}

impl EventSequencer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Admits a serialized event for its `(worker, binding_key)` slot.
    ///
    /// Returns the event when the slot was idle (dispatch it now), or `None`
    /// when it was queued behind the in-flight occupant.
    ///
    /// The event must already carry a worker assignment and a binding key.
    pub(crate) fn put(&mut self, event: Event) -> Option<Event> {
        let worker = event.worker?;
        let key = Arc::clone(event.binding_key.as_ref()?);

        let slot = self.slots.entry((worker, key)).or_insert_with(|| Slot {
            in_use: false,
            queue: VecDeque::new(),
        });

        if slot.in_use {
            slot.queue.push_back(event);
            None
        } else {
            slot.in_use = true;
            Some(event)
        }
    }

    /// Marks the in-flight event for `(worker, binding_key)` complete.
    ///
    /// Returns the promoted queue head (already marked in-flight) for the
    /// caller to dispatch, or `None` when the queue was empty and the slot
    /// was retired.
    pub(crate) fn done(&mut self, worker: WorkerId, binding_key: &Arc<str>) -> Option<Event> {
        let slot_key = (worker, Arc::clone(binding_key));
        let slot = self.slots.get_mut(&slot_key)?;

        match slot.queue.pop_front() {
            Some(next) => Some(next),
            None => {
                self.slots.remove(&slot_key);
                None
            }
        }
    }

    /// Drops the slot for `(worker, binding_key)` entirely, discarding any
    /// queued events. Used when the slot's worker queue is gone and neither
    /// the in-flight event nor the queue can ever be dispatched.
    ///
    /// Returns the number of queued events discarded.
    pub(crate) fn retire(&mut self, worker: WorkerId, binding_key: &Arc<str>) -> usize {
        self.slots
            .remove(&(worker, Arc::clone(binding_key)))
            .map(|s| s.queue.len())
            .unwrap_or(0)
    }

    /// Queued (not in-flight) events for a slot.
    #[cfg(test)]
    pub(crate) fn queued(&self, worker: WorkerId, binding_key: &Arc<str>) -> usize {
        self.slots
            .get(&(worker, Arc::clone(binding_key)))
            .map(|s| s.queue.len())
            .unwrap_or(0)
    }

    /// Number of live slots (busy binding keys).
    #[cfg(test)]
    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(key: &str, binding: &str, worker: usize) -> Event {
        let mut e = Event::new("op", key).with_binding_key(binding).serialized();
        e.worker = Some(WorkerId(worker));
        e
    }

    #[test]
    fn first_event_is_released_immediately() {
        let mut seq = EventSequencer::new();
        let released = seq.put(ev("a", "bk", 0));
        assert_eq!(released.unwrap().key.as_ref(), "a");
        assert_eq!(seq.slot_count(), 1);
    }

    #[test]
    fn later_events_queue_in_arrival_order() {
        let mut seq = EventSequencer::new();
        let bk: Arc<str> = Arc::from("bk");

        assert!(seq.put(ev("a", "bk", 0)).is_some());
        assert!(seq.put(ev("b", "bk", 0)).is_none());
        assert!(seq.put(ev("c", "bk", 0)).is_none());
        assert_eq!(seq.queued(WorkerId(0), &bk), 2);

        let next = seq.done(WorkerId(0), &bk).unwrap();
        assert_eq!(next.key.as_ref(), "b");
        let next = seq.done(WorkerId(0), &bk).unwrap();
        assert_eq!(next.key.as_ref(), "c");

        // Queue drained; slot retired.
        assert!(seq.done(WorkerId(0), &bk).is_none());
        assert_eq!(seq.slot_count(), 0);
    }

    #[test]
    fn slots_are_isolated_per_worker_and_key() {
        let mut seq = EventSequencer::new();
        assert!(seq.put(ev("a", "bk1", 0)).is_some());
        // Different key, same worker: independent slot.
        assert!(seq.put(ev("b", "bk2", 0)).is_some());
        // Same key, different worker: independent slot too.
        assert!(seq.put(ev("c", "bk1", 1)).is_some());
        assert_eq!(seq.slot_count(), 3);
    }

    #[test]
    fn retire_discards_slot_and_queue() {
        let mut seq = EventSequencer::new();
        let bk: Arc<str> = Arc::from("bk");

        assert!(seq.put(ev("a", "bk", 0)).is_some());
        assert!(seq.put(ev("b", "bk", 0)).is_none());
        assert!(seq.put(ev("c", "bk", 0)).is_none());

        assert_eq!(seq.retire(WorkerId(0), &bk), 2);
        assert_eq!(seq.slot_count(), 0);
        // Retired key behaves like a fresh one.
        assert!(seq.put(ev("d", "bk", 0)).is_some());
    }

    #[test]
    fn retire_unknown_slot_is_a_noop() {
        let mut seq = EventSequencer::new();
        let bk: Arc<str> = Arc::from("missing");
        assert_eq!(seq.retire(WorkerId(0), &bk), 0);
    }

    #[test]
    fn done_on_unknown_slot_is_a_noop() {
        let mut seq = EventSequencer::new();
        let bk: Arc<str> = Arc::from("missing");
        assert!(seq.done(WorkerId(0), &bk).is_none());
    }

    #[test]
    fn event_without_routing_is_rejected() {
        let mut seq = EventSequencer::new();
        // No worker stamped.
        let e = Event::new("op", "a").with_binding_key("bk").serialized();
        assert!(seq.put(e).is_none());
        assert_eq!(seq.slot_count(), 0);
    }
}
