//! # eventvisor
//!
//! **Eventvisor** is an actor-style event scheduling library for Rust.
//!
//! It provides primitives to register event handlers, dispatch events across
//! a fixed worker pool with sticky affinity, serialize related events, and
//! drive timer-based polling with bounded retry budgets. The crate is
//! designed as the core runtime for network-function orchestration agents.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │ EventModule  │   │ EventModule  │   │  RpcHandler  │
//!     │ (user module)│   │ (user module)│   │ (user agent) │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Controller (scheduler facade)                                    │
//! │  - HandlerRegistry (id → handler, frozen at start)                │
//! │  - StickyBalancer (binding_key → worker, sticky round robin)      │
//! │  - EventSequencer ((worker, binding_key) mutual exclusion)        │
//! │  - StashQueue (deferred-replay FIFO)                              │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        ▼                  ▼                  ▼               ▼
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐ ┌────────┐
//!     │   Worker 0   │   │   Worker 1   │   │   Worker N   │ │ Poller │
//!     │(mpsc + loop) │   │(mpsc + loop) │   │(mpsc + loop) │ │ (tick) │
//!     └┬─────────────┘   └┬─────────────┘   └┬─────────────┘ └───┬────┘
//!      │                  │                  │                   │
//!      │ handle_event     │ handle_event     │ handle_event      │
//!      │ handle_poll_...  │ handle_poll_...  │ handle_poll_...   │
//!      │ poll_event_...   │ poll_event_...   │ poll_event_...    │
//!      │                  │                  │                   │
//!      └──── PollOp::{Complete, Replace} over ops channel ───────┘
//! ```
//!
//! ### Event flow
//! ```text
//! module ──► Controller::post_event(ev)
//!
//!   ├─► registry lookup (unknown id ─► error, nothing enqueued)
//!   ├─► balancer.assign(binding_key) ─► worker stamped once
//!   ├─► sequencer gate (serialize && binding_key):
//!   │       ├─ slot free   ─► mark busy, dispatch now
//!   │       └─ slot busy   ─► queue behind key, dispatch on event_done
//!   └─► worker queue ─► handler.handle_event(ev)
//!
//! module ──► Controller::poll_event(ev)
//!
//!   └─► PollOp::Add ─► poller cache; each tick, for each due entry:
//!         ├─ budget exhausted      ─► poll_event_cancel (terminal)
//!         ├─ id = EVENT_LIFE_TIMEOUT ─► budget countdown only, no dispatch
//!         └─ else ─► handle_poll_event on the event's worker
//!               ├─ continue_poll=false ─► drop from cache
//!               └─ replacement=Some    ─► swap event in place
//! ```
//!
//! ## Features
//! | Area           | Description                                                         | Key types / traits                        |
//! |----------------|---------------------------------------------------------------------|-------------------------------------------|
//! | **Handlers**   | Register handlers per event id; pluggable modules.                  | [`EventHandler`], [`EventModule`]         |
//! | **Events**     | Build events with payloads, affinity, and retry budgets.            | [`Event`], [`Retries`]                    |
//! | **Scheduling** | Sticky worker affinity and per-binding-key serialization.           | [`Controller`]                            |
//! | **Polling**    | Timer-driven dispatch with spacing, jitter, and bounded budgets.    | [`PollOutcome`], [`EVENT_LIFE_TIMEOUT`]   |
//! | **RPC**        | Topic-bound agents with one shared state-report interval.           | [`RpcAgent`], [`RpcHandler`]              |
//! | **Errors**     | Typed errors for submission and handler execution.                  | [`ControllerError`], [`HandlerError`]     |
//! | **Configuration** | Centralize runtime settings.                                     | [`Config`]                                |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use async_trait::async_trait;
//! use eventvisor::{
//!     Config, Controller, Event, EventDescriptor, EventHandler, HandlerError,
//! };
//!
//! struct FirewallHandler;
//!
//! #[async_trait]
//! impl EventHandler for FirewallHandler {
//!     async fn handle_event(&self, event: Event) -> Result<(), HandlerError> {
//!         println!("configuring firewall {}", event.key);
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = Config::default();
//!     cfg.workers = 2;
//!
//!     let controller = Controller::new(cfg);
//!     controller.register_events(vec![EventDescriptor::new(
//!         "create_firewall",
//!         Arc::new(FirewallHandler),
//!     )])?;
//!     controller.start()?;
//!
//!     let ev = controller
//!         .new_event("create_firewall", "fw-42")
//!         .with_binding_key("tenant-blue")
//!         .serialized();
//!     controller.post_event(ev)?;
//!
//!     tokio::time::sleep(Duration::from_millis(50)).await;
//!     controller.stop();
//!     controller.wait().await;
//!     Ok(())
//! }
//! ```
mod config;
mod core;
mod error;
mod events;
mod handlers;
mod rpc;

// ---- Public re-exports ----

pub use crate::core::Controller;
pub use config::Config;
pub use error::{ControllerError, HandlerError};
pub use events::{Event, Retries, WorkerId, EVENT_LIFE_TIMEOUT};
pub use handlers::{EventDescriptor, EventHandler, EventModule, PollOutcome};
pub use rpc::{RpcAgent, RpcHandler};
