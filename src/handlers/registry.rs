//! # Dispatch table mapping event ids to handlers.
//!
//! [`HandlerRegistry`] is built during module init from
//! [`EventDescriptor`]s and frozen (shared immutably with every worker) when
//! the controller starts. Validation is eager: a duplicate id is rejected at
//! registration, and submission of an unregistered id fails before anything
//! is enqueued.
//!
//! A descriptor may declare a per-event-id poll spacing — the cadence the
//! poller uses between timer dispatches of that id. Ids without a declared
//! spacing are considered due on every tick.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ControllerError;
use crate::handlers::handler::EventHandler;

/// Registration-time binding of an event id to its handler.
///
/// ## Example
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
/// use async_trait::async_trait;
/// use eventvisor::{Event, EventDescriptor, EventHandler, HandlerError};
///
/// struct Noop;
/// #[async_trait]
/// impl EventHandler for Noop {
///     async fn handle_event(&self, _event: Event) -> Result<(), HandlerError> { Ok(()) }
/// }
///
/// let handler = Arc::new(Noop);
/// let desc = EventDescriptor::new("device_health", handler)
///     .with_spacing(Duration::from_secs(10));
/// assert_eq!(desc.id(), "device_health");
/// ```
#[derive(Clone)]
pub struct EventDescriptor {
    id: Arc<str>,
    handler: Arc<dyn EventHandler>,
    spacing: Option<Duration>,
}

impl EventDescriptor {
    /// Binds `id` to `handler` with no declared poll spacing (due every tick).
    pub fn new(id: impl Into<Arc<str>>, handler: Arc<dyn EventHandler>) -> Self {
        Self {
            id: id.into(),
            handler,
            spacing: None,
        }
    }

    /// Declares the poll cadence for this event id, overriding the default
    /// due-every-tick behavior.
    pub fn with_spacing(mut self, spacing: Duration) -> Self {
        self.spacing = Some(spacing);
        self
    }

    /// The event id this descriptor binds.
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Immutable-after-start dispatch table: event id → handler (+ spacing).
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    entries: HashMap<Arc<str>, Registration>,
}

struct Registration {
    handler: Arc<dyn EventHandler>,
    spacing: Option<Duration>,
}

impl HandlerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Adds a descriptor; duplicate ids are rejected.
    pub(crate) fn register(&mut self, desc: EventDescriptor) -> Result<(), ControllerError> {
        if self.entries.contains_key(&desc.id) {
            return Err(ControllerError::DuplicateEvent {
                id: desc.id.to_string(),
            });
        }
        self.entries.insert(
            desc.id,
            Registration {
                handler: desc.handler,
                spacing: desc.spacing,
            },
        );
        Ok(())
    }

    /// True when a handler is bound to `id`.
    pub(crate) fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Handler bound to `id`, if any.
    pub(crate) fn handler(&self, id: &str) -> Option<Arc<dyn EventHandler>> {
        self.entries.get(id).map(|r| Arc::clone(&r.handler))
    }

    /// Declared poll spacing for `id` (`None` = due every tick).
    pub(crate) fn spacing(&self, id: &str) -> Option<Duration> {
        self.entries.get(id).and_then(|r| r.spacing)
    }

    /// Number of registered event ids.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
