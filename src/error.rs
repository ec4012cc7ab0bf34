//! Error types used by the eventvisor runtime and event handlers.
//!
//! This module defines two main error enums:
//!
//! - [`ControllerError`] — errors raised by the scheduling runtime itself
//!   (registration conflicts, unknown event ids, lifecycle misuse).
//! - [`HandlerError`] — errors raised by individual event handler executions.
//!
//! Both types provide an `as_label` helper (snake_case, stable) for
//! logging/metrics. The scheduler never retries a failed handler on its own:
//! a [`HandlerError`] is logged by the worker loop and the event is dropped.
//! Recovery (retry, backoff, giving up) belongs to the handler layer.

use thiserror::Error;

/// # Errors produced by the eventvisor controller.
///
/// These represent misuse of the scheduling runtime, such as posting an
/// event whose id was never registered, or registering handlers after the
/// worker pool has started.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ControllerError {
    /// An event id was registered twice. The dispatch table maps each id to
    /// exactly one handler, so the second registration is rejected eagerly.
    #[error("event id {id:?} is already registered")]
    DuplicateEvent {
        /// The conflicting event id.
        id: String,
    },

    /// No handler is registered for this event id. Raised at submission time,
    /// never deep inside a worker loop.
    #[error("no handler registered for event id {id:?}")]
    UnknownEvent {
        /// The unknown event id.
        id: String,
    },

    /// Registration was attempted after [`Controller::start`](crate::Controller::start).
    /// Handlers and RPC agents are registered once, during module init.
    #[error("registration is closed: controller already started")]
    RegistryFrozen,

    /// `start()` was called twice on the same controller.
    #[error("controller is already running")]
    AlreadyRunning,

    /// A worker inbound queue is gone (controller stopped); the event could
    /// not be delivered.
    #[error("worker {worker} queue is closed; event {id:?} not delivered")]
    QueueClosed {
        /// Index of the unreachable worker.
        worker: usize,
        /// Id of the undeliverable event.
        id: String,
    },

    /// Event payload could not be serialized into the opaque wire value.
    #[error("invalid payload for event {id:?}: {source}")]
    Payload {
        /// Id of the event whose payload was rejected.
        id: String,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

impl ControllerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use eventvisor::ControllerError;
    ///
    /// let err = ControllerError::UnknownEvent { id: "create_network".into() };
    /// assert_eq!(err.as_label(), "controller_unknown_event");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ControllerError::DuplicateEvent { .. } => "controller_duplicate_event",
            ControllerError::UnknownEvent { .. } => "controller_unknown_event",
            ControllerError::RegistryFrozen => "controller_registry_frozen",
            ControllerError::AlreadyRunning => "controller_already_running",
            ControllerError::QueueClosed { .. } => "controller_queue_closed",
            ControllerError::Payload { .. } => "controller_invalid_payload",
        }
    }
}

/// # Errors produced by event handler execution.
///
/// The scheduler is deliberately unopinionated about business-logic failures:
/// it guarantees delivery and ordering, and leaves recovery to the handler.
/// A `Failed` error may succeed on a caller-driven resubmission; `Aborted`
/// means the handler gave up on this occurrence for good.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Handler failed for this occurrence; the caller may resubmit.
    #[error("event handling failed: {reason}")]
    Failed {
        /// The underlying failure message.
        reason: String,
    },

    /// Handler aborted permanently; resubmitting the same event is pointless.
    #[error("event handling aborted: {reason}")]
    Aborted {
        /// The underlying abort message.
        reason: String,
    },
}

impl HandlerError {
    /// Shorthand for [`HandlerError::Failed`].
    pub fn failed(reason: impl Into<String>) -> Self {
        HandlerError::Failed {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`HandlerError::Aborted`].
    pub fn aborted(reason: impl Into<String>) -> Self {
        HandlerError::Aborted {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            HandlerError::Failed { .. } => "handler_failed",
            HandlerError::Aborted { .. } => "handler_aborted",
        }
    }

    /// Indicates whether a caller-driven resubmission could succeed.
    ///
    /// Returns `true` for [`HandlerError::Failed`], `false` for
    /// [`HandlerError::Aborted`].
    pub fn is_resubmittable(&self) -> bool {
        matches!(self, HandlerError::Failed { .. })
    }
}
