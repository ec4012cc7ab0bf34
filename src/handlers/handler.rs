//! # Handler contract for dispatched events.
//!
//! [`EventHandler`] is the extension point modules implement to receive
//! events. Each handler is bound to one or more event ids at registration
//! time through an [`EventDescriptor`](crate::EventDescriptor); the dispatch
//! table is validated eagerly, so an unknown event id fails at submission,
//! never inside a worker loop.
//!
//! ## Contract
//! - [`EventHandler::handle_event`] receives immediately-posted events.
//! - [`EventHandler::handle_poll_event`] receives timer-driven dispatches and
//!   returns a [`PollOutcome`] telling the poller whether to keep the event
//!   cached. The default delegates to `handle_event` and keeps polling.
//! - [`EventHandler::poll_event_cancel`] fires exactly once when a poll
//!   event's retry budget is exhausted — an expected terminal outcome, not an
//!   error.
//!
//! Handlers run on their event's assigned worker task. A handler that blocks
//! synchronously stalls every other event queued on that worker, so prefer
//! async I/O and cooperative waits.
//!
//! ## Example (skeleton)
//! ```rust
//! use async_trait::async_trait;
//! use eventvisor::{Event, EventHandler, HandlerError, PollOutcome};
//!
//! struct FirewallHandler;
//!
//! #[async_trait]
//! impl EventHandler for FirewallHandler {
//!     async fn handle_event(&self, event: Event) -> Result<(), HandlerError> {
//!         // apply configuration...
//!         let _ = event;
//!         Ok(())
//!     }
//!
//!     async fn handle_poll_event(&self, event: Event) -> PollOutcome {
//!         // re-check device status; stop polling once it converges.
//!         let _ = event;
//!         PollOutcome::stop()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::{ControllerError, HandlerError};
use crate::events::Event;

/// What the poller should do with a cached event after a timer dispatch.
///
/// Precedence is explicit: when `continue_poll` is `false` the entry is
/// removed and any `replacement` is ignored; when `true`, a `replacement`
/// substitutes the cached event (its id, payload, and remaining budget) for
/// subsequent ticks.
#[derive(Clone, Debug)]
pub struct PollOutcome {
    /// Keep the event in the poll cache for further ticks.
    pub continue_poll: bool,
    /// Substitute event for the cached entry (only honored when polling
    /// continues).
    pub replacement: Option<Event>,
}

impl PollOutcome {
    /// Keep polling the cached event unchanged.
    #[inline]
    pub fn continue_polling() -> Self {
        Self {
            continue_poll: true,
            replacement: None,
        }
    }

    /// Stop polling; the cached entry is dropped without cancellation.
    #[inline]
    pub fn stop() -> Self {
        Self {
            continue_poll: false,
            replacement: None,
        }
    }

    /// Keep polling, but substitute `event` for the cached entry.
    #[inline]
    pub fn replace_with(event: Event) -> Self {
        Self {
            continue_poll: true,
            replacement: Some(event),
        }
    }
}

/// Contract for event handlers.
///
/// Called from the worker task the event is pinned to. The scheduler logs a
/// returned [`HandlerError`] and moves on; it never retries on its own.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Handles one immediately-posted event.
    async fn handle_event(&self, event: Event) -> Result<(), HandlerError>;

    /// Handles one timer-driven dispatch of a poll event.
    ///
    /// The default delegates to [`handle_event`](EventHandler::handle_event)
    /// (logging any error) and keeps polling. Override to control the poll
    /// lifecycle or reschedule a different event.
    async fn handle_poll_event(&self, event: Event) -> PollOutcome {
        let id = event.id.clone();
        if let Err(e) = self.handle_event(event).await {
            tracing::warn!(event = %id, error = %e, label = e.as_label(), "poll dispatch failed");
        }
        PollOutcome::continue_polling()
    }

    /// Called exactly once when the event's retry budget is exhausted.
    ///
    /// Default: no-op.
    async fn poll_event_cancel(&self, event: Event) {
        let _ = event;
    }
}

/// A pluggable module that wires its handlers into the controller at startup.
///
/// The Rust counterpart of a dropped-in module with a `module_init` entry
/// point: [`Controller::load_modules`](crate::Controller::load_modules) calls
/// `module_init` once per module, skipping names on the configured exclusion
/// list, and logs-and-skips modules whose init fails (never fatal to the
/// controller).
pub trait EventModule: Send + Sync {
    /// Stable module name, matched against the exclusion list.
    fn name(&self) -> &str;

    /// Registers this module's event descriptors and RPC agents.
    fn module_init(&self, controller: &crate::Controller) -> Result<(), ControllerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_constructors() {
        let keep = PollOutcome::continue_polling();
        assert!(keep.continue_poll);
        assert!(keep.replacement.is_none());

        let stop = PollOutcome::stop();
        assert!(!stop.continue_poll);

        let swap = PollOutcome::replace_with(Event::new("other", "k"));
        assert!(swap.continue_poll);
        assert_eq!(swap.replacement.unwrap().id.as_ref(), "other");
    }
}
