//! # Sticky round-robin worker selection.
//!
//! [`StickyBalancer`] decides which worker receives an event. The first
//! request for a binding key assigns the next worker in round-robin order and
//! remembers the mapping for the controller's lifetime (sticky); every later
//! request for the same key returns the same worker. Keyless requests rotate
//! round-robin with no memory.
//!
//! Co-locating related events on one worker is what lets the in-process
//! sequencer enforce ordering without any cross-worker coordination.
//!
//! ## Rules
//! - Same binding key → same worker, always.
//! - N distinct unseen keys over N workers → a permutation of the pool
//!   (no worker repeats before all have been used once).
//! - Keyless events are spread round-robin, unsticky.

use std::collections::HashMap;
use std::sync::Arc;

use crate::events::WorkerId;

/// Sticky round-robin policy over a fixed worker pool.
pub(crate) struct StickyBalancer {
    workers: usize,
    next: usize,
    sticky: HashMap<Arc<str>, WorkerId>,
}

impl StickyBalancer {
    /// Creates a balancer over `workers` pool slots (minimum 1).
    pub(crate) fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            next: 0,
            sticky: HashMap::new(),
        }
    }

    /// Picks the worker for `binding_key`.
    ///
    /// Keyed requests are sticky; keyless requests advance the rotation.
    pub(crate) fn assign(&mut self, binding_key: Option<&Arc<str>>) -> WorkerId {
        match binding_key {
            Some(key) => {
                if let Some(w) = self.sticky.get(key) {
                    return *w;
                }
                let w = self.rotate();
                self.sticky.insert(Arc::clone(key), w);
                w
            }
            None => self.rotate(),
        }
    }

    fn rotate(&mut self) -> WorkerId {
        let w = WorkerId(self.next);
        self.next = (self.next + 1) % self.workers;
        w
    }

    /// Number of remembered binding-key assignments.
    #[cfg(test)]
    pub(crate) fn sticky_len(&self) -> usize {
        self.sticky.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn key(s: &str) -> Arc<str> {
        Arc::from(s)
    }

    #[test]
    fn same_key_is_sticky() {
        let mut lb = StickyBalancer::new(4);
        let k = key("tenant-a");
        let first = lb.assign(Some(&k));
        for _ in 0..20 {
            // Interleave keyless traffic to advance the rotation.
            lb.assign(None);
            assert_eq!(lb.assign(Some(&k)), first);
        }
        assert_eq!(lb.sticky_len(), 1);
    }

    #[test]
    fn distinct_keys_cover_all_workers_before_repeating() {
        let n = 4;
        let mut lb = StickyBalancer::new(n);
        let assigned: HashSet<usize> = (0..n)
            .map(|i| lb.assign(Some(&key(&format!("k{i}")))).index())
            .collect();
        assert_eq!(assigned.len(), n, "expected a permutation of the pool");
    }

    #[test]
    fn keyless_requests_rotate() {
        let mut lb = StickyBalancer::new(3);
        let seq: Vec<usize> = (0..6).map(|_| lb.assign(None).index()).collect();
        assert_eq!(seq, vec![0, 1, 2, 0, 1, 2]);
        assert_eq!(lb.sticky_len(), 0);
    }

    #[test]
    fn keyed_and_keyless_share_one_rotation() {
        let mut lb = StickyBalancer::new(2);
        let a = lb.assign(Some(&key("a"))).index();
        let b = lb.assign(Some(&key("b"))).index();
        assert_ne!(a, b);
        // Rotation wrapped; next keyless pick reuses slot `a`.
        assert_eq!(lb.assign(None).index(), a);
    }

    #[test]
    fn single_worker_pool_always_picks_it() {
        let mut lb = StickyBalancer::new(1);
        for i in 0..5 {
            assert_eq!(lb.assign(Some(&key(&format!("k{i}")))).index(), 0);
            assert_eq!(lb.assign(None).index(), 0);
        }
    }
}
