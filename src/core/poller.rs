//! # Timer-driven poll subsystem.
//!
//! The [`Poller`] is a single task that owns the poll cache: the set of
//! in-flight events awaiting timeout evaluation. Each fixed tick it drains a
//! bounded batch of submissions/completions from its op channel, re-checks
//! which cached events are due, redispatches them to their assigned workers,
//! and retires events whose retry budget ran out.
//!
//! ## Tick algorithm
//! ```text
//! every Config::tick:
//!   1. drain up to Config::drain_batch PollOps into the cache
//!   2. for each cached event:
//!        spacing   = registry-declared per-id spacing, else 0 (due every tick)
//!        due iff   last_run + spacing <= now
//!        on due:   advance last_run to the next spacing boundary (+ ≤5% jitter),
//!                  clear `serialize`, send PollEvent to the attached worker,
//!                  decrement the budget
//!        at zero:  send PollCancel (exactly once) and drop the entry
//! ```
//!
//! ## Rules
//! - Poll dispatch is never sequencer-serialized; the flag is cleared first.
//! - The jitter (up to 5% of spacing) keeps events with identical spacing
//!   from synchronizing into a thundering herd.
//! - `EVENT_LIFE_TIMEOUT` entries are never dispatched to
//!   `handle_poll_event`; their budget counts down on each due tick and
//!   exhaustion goes straight to the cancellation callback.
//! - The cache is owned exclusively by this task. Workers and modules reach
//!   it only through [`PollOp`]s; there is no shared mutable state.
//! - Minimum useful spacing is bounded below by the tick period; there is no
//!   deadline enforcement finer than the tick.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::core::worker::WorkerItem;
use crate::events::{Event, WorkerId};
use crate::handlers::HandlerRegistry;

/// Mutation of the poll cache, sent by the controller or a worker.
#[derive(Debug)]
pub(crate) enum PollOp {
    /// New poll submission (worker already attached).
    Add(Event),
    /// Module- or handler-initiated early completion, matched on `(id, key)`.
    Complete { id: Arc<str>, key: Arc<str> },
    /// Handler-requested substitution of the cached event.
    Replace {
        id: Arc<str>,
        key: Arc<str>,
        event: Event,
    },
}

/// One cached poll event plus its timer bookkeeping.
struct PollEntry {
    event: Event,
    spacing: Duration,
    last_run: Instant,
}

/// The timer task owning the poll cache.
pub(crate) struct Poller {
    ops: mpsc::UnboundedReceiver<PollOp>,
    workers: Vec<mpsc::UnboundedSender<WorkerItem>>,
    registry: Arc<HandlerRegistry>,
    tick: Duration,
    drain_batch: usize,
    token: CancellationToken,
    cache: Vec<PollEntry>,
}

impl Poller {
    pub(crate) fn new(
        ops: mpsc::UnboundedReceiver<PollOp>,
        workers: Vec<mpsc::UnboundedSender<WorkerItem>>,
        registry: Arc<HandlerRegistry>,
        tick: Duration,
        drain_batch: usize,
        token: CancellationToken,
    ) -> Self {
        Self {
            ops,
            workers,
            registry,
            tick: tick.max(Duration::from_millis(1)),
            drain_batch: drain_batch.max(1),
            token,
            cache: Vec::new(),
        }
    }

    /// Runs the tick loop until cancellation.
    pub(crate) async fn run(mut self) {
        let mut ticker = time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = ticker.tick() => {
                    self.drain_ops();
                    self.evaluate();
                }
            }
        }
        tracing::debug!(cached = self.cache.len(), "poller stopped");
    }

    /// Applies a bounded batch of pending ops; the rest wait for next tick.
    fn drain_ops(&mut self) {
        for _ in 0..self.drain_batch {
            match self.ops.try_recv() {
                Ok(op) => self.apply(op),
                Err(_) => break,
            }
        }
    }

    fn apply(&mut self, op: PollOp) {
        match op {
            PollOp::Add(event) => {
                if event.worker().is_none() {
                    tracing::warn!(event = %event.id, "poll submission without worker; dropped");
                    return;
                }
                let spacing = self.registry.spacing(&event.id).unwrap_or(Duration::ZERO);
                self.cache.push(PollEntry {
                    event,
                    spacing,
                    last_run: Instant::now(),
                });
            }
            PollOp::Complete { id, key } => {
                self.cache
                    .retain(|e| !(e.event.id == id && e.event.key == key));
            }
            PollOp::Replace { id, key, event } => {
                // A replacement for an already-retired entry is ignored.
                let Some(entry) = self
                    .cache
                    .iter_mut()
                    .find(|e| e.event.id == id && e.event.key == key)
                else {
                    return;
                };
                if !self.registry.contains(&event.id) {
                    tracing::warn!(from = %id, to = %event.id, "replacement event id not registered; keeping original");
                    return;
                }
                let mut event = event;
                if event.worker.is_none() {
                    // Affinity survives rescheduling under a different id.
                    event.worker = entry.event.worker;
                }
                entry.spacing = self.registry.spacing(&event.id).unwrap_or(Duration::ZERO);
                entry.event = event;
            }
        }
    }

    /// Due-checks every cached entry, dispatching and retiring as needed.
    fn evaluate(&mut self) {
        let now = Instant::now();
        let entries = std::mem::take(&mut self.cache);

        for mut entry in entries {
            if now < entry.last_run + entry.spacing {
                self.cache.push(entry);
                continue;
            }
            let Some(worker) = entry.event.worker() else {
                continue;
            };

            // Submitted already-exhausted: cancel without a single dispatch.
            if entry.event.max_times.is_exhausted() {
                self.send(worker, WorkerItem::PollCancel(entry.event));
                continue;
            }

            entry.last_run = next_slot(entry.last_run, entry.spacing, now);

            if !entry.event.is_lifetime() {
                let mut dispatch = entry.event.clone();
                dispatch.serialize = false;
                self.send(worker, WorkerItem::PollEvent(dispatch));
            }

            entry.event.max_times = entry.event.max_times.decrement();
            if entry.event.max_times.is_exhausted() {
                self.send(worker, WorkerItem::PollCancel(entry.event));
            } else {
                self.cache.push(entry);
            }
        }
    }

    fn send(&self, worker: WorkerId, item: WorkerItem) {
        let Some(tx) = self.workers.get(worker.index()) else {
            tracing::warn!(%worker, "poll dispatch to unknown worker slot");
            return;
        };
        if tx.send(item).is_err() {
            tracing::debug!(%worker, "worker queue closed; poll dispatch dropped");
        }
    }
}

/// Advances `last_run` to the nearest spacing-aligned boundary at or past
/// `now`, plus up to 5% random jitter.
fn next_slot(last_run: Instant, spacing: Duration, now: Instant) -> Instant {
    if spacing.is_zero() {
        return now;
    }
    let spacing_s = spacing.as_secs_f64();
    let elapsed = now.duration_since(last_run).as_secs_f64();
    let periods = (elapsed / spacing_s).floor().max(1.0);
    let jitter = spacing_s * 0.05 * rand::rng().random::<f64>();
    last_run + Duration::from_secs_f64(periods * spacing_s + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::events::{Retries, EVENT_LIFE_TIMEOUT};
    use crate::handlers::{EventDescriptor, EventHandler};
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl EventHandler for Noop {
        async fn handle_event(&self, _event: Event) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    struct Rig {
        ops: mpsc::UnboundedSender<PollOp>,
        worker_rx: mpsc::UnboundedReceiver<WorkerItem>,
        token: CancellationToken,
    }

    /// Spawns a poller over one fake worker queue with a 10ms tick.
    fn spawn_poller(ids: &[(&str, Option<Duration>)], tick: Duration) -> Rig {
        let mut registry = HandlerRegistry::new();
        for (id, spacing) in ids {
            let mut desc = EventDescriptor::new(*id, Arc::new(Noop) as Arc<dyn EventHandler>);
            if let Some(s) = spacing {
                desc = desc.with_spacing(*s);
            }
            registry.register(desc).unwrap();
        }

        let (ops_tx, ops_rx) = mpsc::unbounded_channel();
        let (worker_tx, worker_rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let poller = Poller::new(
            ops_rx,
            vec![worker_tx],
            Arc::new(registry),
            tick,
            16,
            token.clone(),
        );
        tokio::spawn(poller.run());

        Rig {
            ops: ops_tx,
            worker_rx,
            token,
        }
    }

    fn poll_event(id: &str, key: &str, max_times: Retries) -> Event {
        let mut ev = Event::new(id, key).with_max_times(max_times);
        ev.worker = Some(WorkerId(0));
        ev
    }

    async fn collect(rx: &mut mpsc::UnboundedReceiver<WorkerItem>, window: Duration) -> Vec<WorkerItem> {
        let mut items = Vec::new();
        let deadline = time::sleep(window);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                item = rx.recv() => match item {
                    Some(it) => items.push(it),
                    None => break,
                },
            }
        }
        items
    }

    #[tokio::test]
    async fn bounded_budget_dispatches_then_cancels_once() {
        let mut rig = spawn_poller(&[("check", None)], Duration::from_millis(10));
        rig.ops
            .send(PollOp::Add(poll_event("check", "k1", Retries::Bounded(2))))
            .unwrap();

        let items = collect(&mut rig.worker_rx, Duration::from_millis(300)).await;
        rig.token.cancel();

        let polls = items
            .iter()
            .filter(|i| matches!(i, WorkerItem::PollEvent(_)))
            .count();
        let cancels = items
            .iter()
            .filter(|i| matches!(i, WorkerItem::PollCancel(_)))
            .count();
        assert_eq!(polls, 2, "exactly max_times dispatches");
        assert_eq!(cancels, 1, "cancel fires exactly once");
    }

    #[tokio::test]
    async fn complete_removes_entry_before_exhaustion() {
        let mut rig = spawn_poller(&[("check", None)], Duration::from_millis(10));
        rig.ops
            .send(PollOp::Add(poll_event("check", "k1", Retries::Unbounded)))
            .unwrap();

        // Let a few dispatches through, then complete.
        let first = collect(&mut rig.worker_rx, Duration::from_millis(80)).await;
        assert!(!first.is_empty());
        rig.ops
            .send(PollOp::Complete {
                id: Arc::from("check"),
                key: Arc::from("k1"),
            })
            .unwrap();

        // Allow the op to drain, then verify silence.
        time::sleep(Duration::from_millis(50)).await;
        while rig.worker_rx.try_recv().is_ok() {}
        let after = collect(&mut rig.worker_rx, Duration::from_millis(80)).await;
        rig.token.cancel();
        assert!(after.is_empty(), "no dispatches after completion");
    }

    #[tokio::test]
    async fn spacing_is_respected_between_dispatches() {
        let spacing = Duration::from_millis(100);
        let mut rig = spawn_poller(&[("spaced", Some(spacing))], Duration::from_millis(10));
        rig.ops
            .send(PollOp::Add(poll_event("spaced", "k1", Retries::Bounded(3))))
            .unwrap();

        let mut stamps = Vec::new();
        let deadline = time::sleep(Duration::from_millis(600));
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                item = rig.worker_rx.recv() => match item {
                    Some(WorkerItem::PollEvent(_)) => stamps.push(Instant::now()),
                    Some(_) => {}
                    None => break,
                },
            }
        }
        rig.token.cancel();

        assert!(stamps.len() >= 2, "expected repeated dispatches");
        for pair in stamps.windows(2) {
            let gap = pair[1].duration_since(pair[0]);
            // 5% jitter tolerance minus one tick of scheduling slack.
            assert!(
                gap >= Duration::from_millis(85),
                "dispatches too close: {gap:?}"
            );
        }
    }

    #[tokio::test]
    async fn lifetime_events_expire_without_dispatch() {
        let mut rig = spawn_poller(
            &[(EVENT_LIFE_TIMEOUT, Some(Duration::from_millis(30)))],
            Duration::from_millis(10),
        );
        rig.ops
            .send(PollOp::Add(poll_event(
                EVENT_LIFE_TIMEOUT,
                "fw-1",
                Retries::Bounded(2),
            )))
            .unwrap();

        let items = collect(&mut rig.worker_rx, Duration::from_millis(300)).await;
        rig.token.cancel();

        assert!(
            items.iter().all(|i| matches!(i, WorkerItem::PollCancel(_))),
            "lifetime id must never reach handle_poll_event"
        );
        assert_eq!(items.len(), 1, "exactly one expiry callback");
    }

    #[tokio::test]
    async fn replacement_substitutes_cached_event() {
        let mut rig = spawn_poller(&[("a", None), ("b", None)], Duration::from_millis(10));
        rig.ops
            .send(PollOp::Add(poll_event("a", "k1", Retries::Bounded(4))))
            .unwrap();

        // Wait for the first dispatch of `a`, then swap the cached event.
        let first = collect(&mut rig.worker_rx, Duration::from_millis(60)).await;
        assert!(first
            .iter()
            .any(|i| matches!(i, WorkerItem::PollEvent(e) if e.id.as_ref() == "a")));
        rig.ops
            .send(PollOp::Replace {
                id: Arc::from("a"),
                key: Arc::from("k1"),
                event: Event::new("b", "k1").with_max_times(Retries::Bounded(2)),
            })
            .unwrap();

        time::sleep(Duration::from_millis(30)).await;
        while rig.worker_rx.try_recv().is_ok() {}
        let after = collect(&mut rig.worker_rx, Duration::from_millis(200)).await;
        rig.token.cancel();

        assert!(
            after
                .iter()
                .filter_map(|i| match i {
                    WorkerItem::PollEvent(e) => Some(e.id.as_ref()),
                    _ => None,
                })
                .all(|id| id == "b"),
            "all dispatches after replacement carry the new id"
        );
    }

    #[test]
    fn next_slot_aligns_to_spacing_boundary() {
        let spacing = Duration::from_secs(10);
        let last = Instant::now();
        let now = last + Duration::from_secs(25);

        let slot = next_slot(last, spacing, now);
        let advance = slot.duration_since(last);
        // Two full periods plus at most 5% jitter.
        assert!(advance >= Duration::from_secs(20));
        assert!(advance <= Duration::from_secs_f64(20.5));
    }

    #[test]
    fn next_slot_zero_spacing_is_now() {
        let last = Instant::now();
        let now = last + Duration::from_millis(7);
        assert_eq!(next_slot(last, Duration::ZERO, now), now);
    }
}
