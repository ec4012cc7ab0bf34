//! # Controller: composes the scheduler and exposes the call surface.
//!
//! The [`Controller`] is the single object modules use to register handlers,
//! submit events, and register RPC agents. It owns the sticky balancer, the
//! sequencer map, the stash, and — once started — the worker pool, the
//! poller, and the shared state-report task.
//!
//! ## High-level architecture
//! ```text
//! module ──► post_event ──► balancer.assign ──► sequencer gate ──► worker queue
//!        ──► poll_event ──► balancer.assign ──► PollOp::Add ────► poller cache
//!        ──► stash_event ─────────────────────────────────────► stash FIFO
//!
//! start():
//!   registry frozen (Arc-shared, immutable)
//!   worker[0..N]   ← one task per queue, fixed for the controller lifetime
//!   poller         ← single timer task owning the poll cache
//!   report task    ← one shared interval over all RPC agents
//!
//! stop(): cancellation token fans out to every task
//! wait(): joins them all
//! ```
//!
//! ## Rules
//! - Registration (`register_events`, `register_rpc_agents`, `load_modules`)
//!   happens before `start()`; afterwards the dispatch table is frozen.
//! - `post_event` never blocks beyond queue-enqueue and either succeeds or
//!   returns an error for a malformed/unknown event.
//! - The sequencer map and poll cache are owned by the controller side;
//!   workers reach them only through channel-borne ops.
//! - Events keep their first worker assignment forever; `event_done`
//!   promotion redispatches to the same worker.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::core::balancer::StickyBalancer;
use crate::core::poller::{PollOp, Poller};
use crate::core::sequencer::EventSequencer;
use crate::core::stash::StashQueue;
use crate::core::worker::{Worker, WorkerItem};
use crate::error::ControllerError;
use crate::events::{Event, WorkerId};
use crate::handlers::{EventDescriptor, EventModule, HandlerRegistry};
use crate::rpc::{self, RpcAgent};

/// Dispatch table lifecycle: open during module init, frozen at start.
enum RegistryState {
    Open(HandlerRegistry),
    Frozen(Arc<HandlerRegistry>),
}

impl RegistryState {
    fn contains(&self, id: &str) -> bool {
        match self {
            RegistryState::Open(r) => r.contains(id),
            RegistryState::Frozen(r) => r.contains(id),
        }
    }
}

struct Inner {
    cfg: Config,
    worker_txs: Vec<mpsc::UnboundedSender<WorkerItem>>,
    worker_rxs: Mutex<Vec<mpsc::UnboundedReceiver<WorkerItem>>>,
    poll_tx: mpsc::UnboundedSender<PollOp>,
    poll_rx: Mutex<Option<mpsc::UnboundedReceiver<PollOp>>>,
    registry: Mutex<RegistryState>,
    balancer: Mutex<StickyBalancer>,
    sequencer: Mutex<EventSequencer>,
    stash: StashQueue,
    agents: Mutex<Vec<RpcAgent>>,
    token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// The scheduler facade. Cheap to clone; all clones share one runtime.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Controller {
    /// Creates a stopped controller; worker count is fixed here and for the
    /// controller's lifetime.
    pub fn new(cfg: Config) -> Self {
        let workers = cfg.worker_count();
        let mut worker_txs = Vec::with_capacity(workers);
        let mut worker_rxs = Vec::with_capacity(workers);
        for _ in 0..workers {
            let (tx, rx) = mpsc::unbounded_channel();
            worker_txs.push(tx);
            worker_rxs.push(rx);
        }
        let (poll_tx, poll_rx) = mpsc::unbounded_channel();

        Self {
            inner: Arc::new(Inner {
                balancer: Mutex::new(StickyBalancer::new(workers)),
                sequencer: Mutex::new(EventSequencer::new()),
                registry: Mutex::new(RegistryState::Open(HandlerRegistry::new())),
                stash: StashQueue::new(),
                agents: Mutex::new(Vec::new()),
                worker_txs,
                worker_rxs: Mutex::new(worker_rxs),
                poll_tx,
                poll_rx: Mutex::new(Some(poll_rx)),
                token: CancellationToken::new(),
                tasks: Mutex::new(Vec::new()),
                cfg,
            }),
        }
    }

    /// Number of workers in the fixed pool.
    pub fn workers(&self) -> usize {
        self.inner.worker_txs.len()
    }

    // ---------------------------
    // Registration (before start)
    // ---------------------------

    /// Registers event descriptors; duplicate ids and post-start calls fail.
    pub fn register_events(
        &self,
        descriptors: Vec<EventDescriptor>,
    ) -> Result<(), ControllerError> {
        let mut reg = lock(&self.inner.registry);
        match &mut *reg {
            RegistryState::Open(registry) => {
                for desc in descriptors {
                    registry.register(desc)?;
                }
                Ok(())
            }
            RegistryState::Frozen(_) => Err(ControllerError::RegistryFrozen),
        }
    }

    /// Registers RPC agents for the shared state-report task.
    pub fn register_rpc_agents(&self, agents: Vec<RpcAgent>) -> Result<(), ControllerError> {
        if matches!(&*lock(&self.inner.registry), RegistryState::Frozen(_)) {
            return Err(ControllerError::RegistryFrozen);
        }
        lock(&self.inner.agents).extend(agents);
        Ok(())
    }

    /// Runs `module_init` for each module, honoring the exclusion list.
    ///
    /// A module whose init fails is logged and skipped — never fatal to the
    /// controller.
    pub fn load_modules(&self, modules: &[Arc<dyn EventModule>]) {
        for module in modules {
            let name = module.name();
            if self.inner.cfg.excluded_modules.iter().any(|n| n == name) {
                tracing::debug!(module = name, "module excluded by configuration");
                continue;
            }
            if let Err(e) = module.module_init(self) {
                tracing::warn!(module = name, error = %e, label = e.as_label(), "module init failed; skipped");
            }
        }
    }

    // ---------------------------
    // Event submission
    // ---------------------------

    /// Constructs an event; does not schedule it.
    pub fn new_event(&self, id: impl Into<Arc<str>>, key: impl Into<Arc<str>>) -> Event {
        Event::new(id, key)
    }

    /// Dispatches an event to its affine worker (fire-and-forget).
    ///
    /// Resolves worker affinity, stamps the assignment, and runs the
    /// serialization gate; a serialized event queued behind its binding key
    /// is held by the sequencer and dispatched later by
    /// [`event_done`](Controller::event_done). Never blocks beyond enqueue.
    pub fn post_event(&self, event: Event) -> Result<(), ControllerError> {
        self.ensure_registered(&event.id)?;
        let (event, worker) = self.attach_worker(event);

        match self.sequence_event(event) {
            Some(event) => {
                // Some iff the sequencer admitted this event and marked its
                // slot busy; an undeliverable event must not leave it so.
                let slot_key = event.serialize.then(|| event.binding_key.clone()).flatten();
                let sent = self.send_to_worker(worker, WorkerItem::Event(event));
                if sent.is_err() {
                    if let Some(key) = &slot_key {
                        self.retire_slot(worker, key);
                    }
                }
                sent
            }
            None => Ok(()),
        }
    }

    /// Hands an event to the poll subsystem instead of dispatching it.
    ///
    /// The timer budget comes from the event's `max_times`
    /// ([`Retries`](crate::Retries), default unbounded).
    pub fn poll_event(&self, event: Event) -> Result<(), ControllerError> {
        self.ensure_registered(&event.id)?;
        let (event, _worker) = self.attach_worker(event);

        if self.inner.poll_tx.send(PollOp::Add(event)).is_err() {
            tracing::debug!("poller gone; poll submission dropped");
        }
        Ok(())
    }

    /// Module-initiated early completion: drops the `(id, key)` entry from
    /// the poll cache on the next tick.
    pub fn poll_event_done(&self, event: &Event) {
        let op = PollOp::Complete {
            id: event.id.clone(),
            key: event.key.clone(),
        };
        if self.inner.poll_tx.send(op).is_err() {
            tracing::debug!("poller gone; poll completion dropped");
        }
    }

    /// Completes a serialized event and dispatches the next queued event for
    /// its `(worker, binding_key)`, if any.
    ///
    /// Pass the event exactly as the handler received it (it carries the
    /// worker assignment). A no-op for events outside the sequencer:
    /// non-serialized events never hold a slot, whatever routing metadata
    /// they carry.
    pub fn event_done(&self, event: &Event) -> Result<(), ControllerError> {
        if !event.serialize {
            return Ok(());
        }
        let (Some(worker), Some(binding_key)) = (event.worker(), event.binding_key.as_ref())
        else {
            return Ok(());
        };
        let next = lock(&self.inner.sequencer).done(worker, binding_key);
        match next {
            Some(promoted) => {
                let sent = self.send_to_worker(worker, WorkerItem::Event(promoted));
                if sent.is_err() {
                    self.retire_slot(worker, binding_key);
                }
                sent
            }
            None => Ok(()),
        }
    }

    /// Runs the serialization gate for an already-routed event.
    ///
    /// Returns the event when it needs no serialization or is first for its
    /// key (dispatch it now); `None` means it was queued behind the key.
    /// `post_event` calls this internally; it is public for modules that
    /// manage dispatch themselves.
    pub fn sequence_event(&self, event: Event) -> Option<Event> {
        if event.serialize && event.binding_key.is_some() && event.worker().is_some() {
            lock(&self.inner.sequencer).put(event)
        } else {
            Some(event)
        }
    }

    /// Appends an event to the deferred-replay stash.
    pub fn stash_event(&self, event: Event) {
        self.inner.stash.push(event);
    }

    /// Pops the oldest stashed event, if any (non-blocking).
    pub fn get_stash_event(&self) -> Option<Event> {
        self.inner.stash.pop()
    }

    // ---------------------------
    // Lifecycle
    // ---------------------------

    /// Freezes the registry and spawns the worker pool, the poller, and the
    /// shared RPC report task.
    pub fn start(&self) -> Result<(), ControllerError> {
        let registry = self.freeze_registry()?;

        let worker_rxs: Vec<_> = lock(&self.inner.worker_rxs).drain(..).collect();
        let mut tasks = Vec::with_capacity(worker_rxs.len() + 2);

        for (index, rx) in worker_rxs.into_iter().enumerate() {
            let worker = Worker::new(
                WorkerId(index),
                Arc::clone(&registry),
                rx,
                self.inner.poll_tx.clone(),
                self.inner.token.clone(),
            );
            tasks.push(tokio::spawn(worker.run()));
        }

        if let Some(poll_rx) = lock(&self.inner.poll_rx).take() {
            let poller = Poller::new(
                poll_rx,
                self.inner.worker_txs.clone(),
                registry,
                self.inner.cfg.tick_clamped(),
                self.inner.cfg.drain_batch_clamped(),
                self.inner.token.clone(),
            );
            tasks.push(tokio::spawn(poller.run()));
        }

        let agents: Vec<RpcAgent> = lock(&self.inner.agents).clone();
        if !agents.is_empty() {
            tasks.push(tokio::spawn(rpc::report_loop(
                agents,
                self.inner.cfg.report_interval,
                self.inner.token.clone(),
            )));
        }

        lock(&self.inner.tasks).extend(tasks);
        Ok(())
    }

    /// Requests shutdown of every spawned task (workers drain in-flight
    /// handlers before exiting).
    pub fn stop(&self) {
        self.inner.token.cancel();
    }

    /// Joins all spawned tasks.
    pub async fn wait(&self) {
        let tasks: Vec<_> = lock(&self.inner.tasks).drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
    }

    // ---------------------------
    // Helpers
    // ---------------------------

    fn ensure_registered(&self, id: &str) -> Result<(), ControllerError> {
        if lock(&self.inner.registry).contains(id) {
            Ok(())
        } else {
            Err(ControllerError::UnknownEvent { id: id.to_string() })
        }
    }

    /// Stamps the worker assignment (first routing only) and returns it.
    fn attach_worker(&self, mut event: Event) -> (Event, WorkerId) {
        let worker = match event.worker() {
            Some(w) => w,
            None => {
                let w = lock(&self.inner.balancer).assign(event.binding_key.as_ref());
                event.worker = Some(w);
                w
            }
        };
        (event, worker)
    }

    /// Reconciles sequencer state after a failed delivery: a slot whose
    /// worker queue is gone can never dispatch again, so it is dropped
    /// instead of staying busy forever.
    fn retire_slot(&self, worker: WorkerId, binding_key: &Arc<str>) {
        let dropped = lock(&self.inner.sequencer).retire(worker, binding_key);
        if dropped > 0 {
            tracing::warn!(%worker, key = %binding_key, dropped, "sequencer slot retired with events still queued");
        }
    }

    /// Live sequencer slots (busy binding keys).
    #[cfg(test)]
    fn sequencer_slots(&self) -> usize {
        lock(&self.inner.sequencer).slot_count()
    }

    fn send_to_worker(&self, worker: WorkerId, item: WorkerItem) -> Result<(), ControllerError> {
        let Some(tx) = self.inner.worker_txs.get(worker.index()) else {
            return Err(ControllerError::QueueClosed {
                worker: worker.index(),
                id: item_id(&item),
            });
        };
        tx.send(item).map_err(|e| ControllerError::QueueClosed {
            worker: worker.index(),
            id: item_id(&e.0),
        })
    }

    fn freeze_registry(&self) -> Result<Arc<HandlerRegistry>, ControllerError> {
        let mut reg = lock(&self.inner.registry);
        match std::mem::replace(
            &mut *reg,
            RegistryState::Frozen(Arc::new(HandlerRegistry::new())),
        ) {
            RegistryState::Open(registry) => {
                let frozen = Arc::new(registry);
                *reg = RegistryState::Frozen(Arc::clone(&frozen));
                Ok(frozen)
            }
            RegistryState::Frozen(existing) => {
                *reg = RegistryState::Frozen(existing);
                Err(ControllerError::AlreadyRunning)
            }
        }
    }
}

fn item_id(item: &WorkerItem) -> String {
    match item {
        WorkerItem::Event(e) | WorkerItem::PollEvent(e) | WorkerItem::PollCancel(e) => {
            e.id.to_string()
        }
    }
}
