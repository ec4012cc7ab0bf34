//! # Handler contract and dispatch table.
//!
//! - [`EventHandler`]: duck-typed capability set (`handle_event`,
//!   `handle_poll_event`, `poll_event_cancel`) expressed as a trait with
//!   defaults;
//! - [`EventDescriptor`]: registration-time binding of an event id to its
//!   handler, optionally with a per-id poll spacing;
//! - [`EventModule`]: pluggable module with a `module_init` entry point;
//! - [`PollOutcome`]: explicit continue/stop/replace decision returned from
//!   poll dispatches.

mod handler;
mod registry;

pub use handler::{EventHandler, EventModule, PollOutcome};
pub use registry::EventDescriptor;

pub(crate) use registry::HandlerRegistry;
