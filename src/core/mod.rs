//! # Scheduler internals.
//!
//! Everything behind the [`Controller`] facade: worker routing
//! ([`balancer`]), per-binding-key mutual exclusion ([`sequencer`]), the
//! worker pool ([`worker`]), the timer-driven poll subsystem ([`poller`]),
//! and the deferred-replay stash ([`stash`]).
//!
//! Only [`Controller`] is public; the submodules communicate over channels
//! and are owned by the controller's spawned tasks.

mod balancer;
mod controller;
mod poller;
mod sequencer;
mod stash;
mod worker;

pub use controller::Controller;
