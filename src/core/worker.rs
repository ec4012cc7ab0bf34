//! # Worker: one pool member running a receive-dispatch loop.
//!
//! Each [`Worker`] owns a private inbound queue and a shared (immutable)
//! handler registry. It dequeues [`WorkerItem`]s and invokes the registered
//! handler; handlers may themselves submit more events, recursively, through
//! the controller handle they captured at init.
//!
//! ## Dispatch kinds
//! ```text
//! WorkerItem::Event(ev)      → handler.handle_event(ev)
//! WorkerItem::PollEvent(ev)  → handler.handle_poll_event(ev) → PollOutcome
//!                                  ├─ continue_poll=false → PollOp::Complete
//!                                  └─ replacement=Some    → PollOp::Replace
//! WorkerItem::PollCancel(ev) → handler.poll_event_cancel(ev)
//! ```
//!
//! ## Rules
//! - Dispatches start in queue order but run as independent tasks: two
//!   non-serialized events on one worker may be in flight concurrently.
//!   Mutual exclusion for serialized events comes from the sequencer alone.
//! - Every handler invocation is wrapped in `catch_unwind`: one bad event
//!   logs a warning, it never takes the worker down.
//! - Handler `Err` results are logged and dropped; the scheduler does not
//!   retry (recovery is the handler's concern).
//! - Workers never touch the poll cache directly; poll outcomes travel back
//!   to the poller over its op channel.
//! - There is no work stealing: a hot binding key stays on its assigned
//!   worker. That is the deliberate cost of sticky affinity.

use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::core::poller::PollOp;
use crate::events::{Event, WorkerId};
use crate::handlers::HandlerRegistry;

/// One queued dispatch for a worker.
#[derive(Debug)]
pub(crate) enum WorkerItem {
    /// Immediately-posted event → `handle_event`.
    Event(Event),
    /// Timer-driven dispatch → `handle_poll_event`, outcome reported back.
    PollEvent(Event),
    /// Retry budget exhausted → `poll_event_cancel` (terminal).
    PollCancel(Event),
}

/// A single pool member: private queue, shared registry, dispatch loop.
pub(crate) struct Worker {
    id: WorkerId,
    registry: Arc<HandlerRegistry>,
    rx: mpsc::UnboundedReceiver<WorkerItem>,
    poll_ops: mpsc::UnboundedSender<PollOp>,
    token: CancellationToken,
}

impl Worker {
    pub(crate) fn new(
        id: WorkerId,
        registry: Arc<HandlerRegistry>,
        rx: mpsc::UnboundedReceiver<WorkerItem>,
        poll_ops: mpsc::UnboundedSender<PollOp>,
        token: CancellationToken,
    ) -> Self {
        Self {
            id,
            registry,
            rx,
            poll_ops,
            token,
        }
    }

    /// Runs the receive-dispatch loop until cancellation or queue closure,
    /// then drains in-flight handler tasks.
    pub(crate) async fn run(mut self) {
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                item = self.rx.recv() => match item {
                    Some(item) => {
                        let registry = Arc::clone(&self.registry);
                        let poll_ops = self.poll_ops.clone();
                        let worker = self.id;
                        in_flight.spawn(dispatch(worker, registry, poll_ops, item));
                    }
                    None => break,
                },
            }
        }

        while in_flight.join_next().await.is_some() {}
        tracing::debug!(worker = %self.id, "worker loop stopped");
    }
}

async fn dispatch(
    worker: WorkerId,
    registry: Arc<HandlerRegistry>,
    poll_ops: mpsc::UnboundedSender<PollOp>,
    item: WorkerItem,
) {
    match item {
        WorkerItem::Event(event) => {
            let Some(handler) = registry.handler(&event.id) else {
                // Registration is validated at submission; this means the
                // event outlived a registry it was never part of.
                tracing::warn!(%worker, event = %event.id, "no handler for dispatched event");
                return;
            };
            let id = event.id.clone();

            match std::panic::AssertUnwindSafe(handler.handle_event(event))
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(%worker, event = %id, error = %e, label = e.as_label(), "handler failed");
                }
                Err(panic) => {
                    tracing::warn!(%worker, event = %id, ?panic, "handler panicked");
                }
            }
        }
        WorkerItem::PollEvent(event) => {
            let Some(handler) = registry.handler(&event.id) else {
                tracing::warn!(%worker, event = %event.id, "no handler for poll event");
                return;
            };
            let id = event.id.clone();
            let key = event.key.clone();

            match std::panic::AssertUnwindSafe(handler.handle_poll_event(event))
                .catch_unwind()
                .await
            {
                Ok(outcome) => {
                    if !outcome.continue_poll {
                        let _ = poll_ops.send(PollOp::Complete { id, key });
                    } else if let Some(replacement) = outcome.replacement {
                        let _ = poll_ops.send(PollOp::Replace {
                            id,
                            key,
                            event: replacement,
                        });
                    }
                }
                Err(panic) => {
                    tracing::warn!(%worker, event = %id, ?panic, "poll handler panicked");
                }
            }
        }
        WorkerItem::PollCancel(event) => {
            let Some(handler) = registry.handler(&event.id) else {
                return;
            };
            let id = event.id.clone();

            if let Err(panic) = std::panic::AssertUnwindSafe(handler.poll_event_cancel(event))
                .catch_unwind()
                .await
            {
                tracing::warn!(%worker, event = %id, ?panic, "cancel callback panicked");
            }
        }
    }
}
