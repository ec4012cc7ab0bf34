//! # Events dispatched through the eventvisor runtime.
//!
//! An [`Event`] is one unit of work: an id naming the registered handler, an
//! opaque serializable payload, and routing metadata (affinity key,
//! serialization flag, retry budget).
//!
//! ## Routing fields
//! - `key` identifies one logical occurrence of the event id; `event_done`
//!   and `poll_event_done` match on `(id, key)`.
//! - `binding_key` is the affinity token: events sharing a binding key are
//!   routed to the same worker (sticky round robin), which is what makes
//!   in-process serialization meaningful.
//! - `serialize` opts the event into mutual exclusion among same-binding-key
//!   events; it is cleared by the poller before timer-driven dispatch.
//! - `max_times` bounds timer-driven dispatches ([`Retries`]).
//!
//! The worker assignment is stamped once, on first routing, and never
//! reassigned afterwards.
//!
//! ## Example
//! ```rust
//! use eventvisor::{Event, Retries};
//! use serde_json::json;
//!
//! let ev = Event::new("create_firewall", "fw-42")
//!     .with_data(json!({"tenant": "blue"}))
//!     .with_binding_key("tenant-blue")
//!     .serialized()
//!     .with_max_times(Retries::Bounded(3));
//!
//! assert_eq!(ev.id.as_ref(), "create_firewall");
//! assert!(ev.serialize);
//! assert_eq!(ev.max_times, Retries::Bounded(3));
//! ```

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::ControllerError;
use crate::events::retries::Retries;

/// Reserved event id for fixed-lifetime expiry tracking.
///
/// Events submitted to the poller under this id are never dispatched to
/// `handle_poll_event`; their retry budget counts down on each due tick and
/// exhaustion goes straight to the handler's `poll_event_cancel`. Submitting
/// with spacing `s` and `max_times = k` expires the event after roughly
/// `s × k` of wall clock.
pub const EVENT_LIFE_TIMEOUT: &str = "event_life_timeout";

/// Index of a worker in the fixed pool.
///
/// Stamped onto an event when the balancer first routes it; all later
/// dispatches of the same event (sequencer promotion, poll redispatch) reuse
/// the stamped worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WorkerId(pub(crate) usize);

impl WorkerId {
    /// Zero-based index into the worker pool.
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// One unit of work flowing through the scheduler.
///
/// Built with [`Event::new`] plus `with_*` chainers; submitted via
/// [`Controller::post_event`](crate::Controller::post_event) (immediate) or
/// [`Controller::poll_event`](crate::Controller::poll_event) (timer-driven).
#[derive(Clone, Debug)]
pub struct Event {
    /// Handler tag: which registered handler this event belongs to.
    pub id: Arc<str>,
    /// Opaque payload, passed through to the handler untouched.
    pub data: Value,
    /// Identifies one logical occurrence of this event id.
    pub key: Arc<str>,
    /// Optional affinity token grouping related events onto one worker.
    pub binding_key: Option<Arc<str>>,
    /// Whether this event participates in per-binding-key serialization.
    pub serialize: bool,
    /// Remaining timer-driven dispatches before forced cancellation.
    pub max_times: Retries,

    /// Worker chosen by the balancer; assigned once, immutable afterwards.
    pub(crate) worker: Option<WorkerId>,
}

impl Event {
    /// Creates a new event with an empty payload and no affinity.
    pub fn new(id: impl Into<Arc<str>>, key: impl Into<Arc<str>>) -> Self {
        Self {
            id: id.into(),
            data: Value::Null,
            key: key.into(),
            binding_key: None,
            serialize: false,
            max_times: Retries::Unbounded,
            worker: None,
        }
    }

    /// Attaches an already-serialized payload.
    #[inline]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Serializes `data` and attaches it as the payload.
    ///
    /// Fails with [`ControllerError::Payload`] when the value cannot be
    /// represented (e.g. a map with non-string keys).
    pub fn try_with_data<T: Serialize>(mut self, data: &T) -> Result<Self, ControllerError> {
        self.data = serde_json::to_value(data).map_err(|source| ControllerError::Payload {
            id: self.id.to_string(),
            source,
        })?;
        Ok(self)
    }

    /// Attaches an affinity token; all events sharing it land on one worker.
    #[inline]
    pub fn with_binding_key(mut self, binding_key: impl Into<Arc<str>>) -> Self {
        self.binding_key = Some(binding_key.into());
        self
    }

    /// Opts the event into per-binding-key mutual exclusion.
    ///
    /// Callers must set this consistently for a given key if ordering
    /// matters: a non-serialized event bypasses the sequencer even while
    /// serialized events for the same key are queued.
    #[inline]
    pub fn serialized(mut self) -> Self {
        self.serialize = true;
        self
    }

    /// Sets the timer-dispatch budget for poll submission.
    #[inline]
    pub fn with_max_times(mut self, max_times: Retries) -> Self {
        self.max_times = max_times;
        self
    }

    /// Worker this event is pinned to, if it has been routed yet.
    #[inline]
    pub fn worker(&self) -> Option<WorkerId> {
        self.worker
    }

    /// Deserializes the payload into a concrete type.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, ControllerError> {
        serde_json::from_value(self.data.clone()).map_err(|source| ControllerError::Payload {
            id: self.id.to_string(),
            source,
        })
    }

    /// True when this is the reserved fixed-lifetime expiry id.
    #[inline]
    pub(crate) fn is_lifetime(&self) -> bool {
        self.id.as_ref() == EVENT_LIFE_TIMEOUT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn builder_sets_routing_fields() {
        let ev = Event::new("vpn_sync", "vpn-1")
            .with_binding_key("site-a")
            .serialized()
            .with_max_times(Retries::Bounded(5));

        assert_eq!(ev.id.as_ref(), "vpn_sync");
        assert_eq!(ev.key.as_ref(), "vpn-1");
        assert_eq!(ev.binding_key.as_deref(), Some("site-a"));
        assert!(ev.serialize);
        assert_eq!(ev.max_times, Retries::Bounded(5));
        assert_eq!(ev.worker(), None);
    }

    #[test]
    fn defaults_are_unbound_and_unserialized() {
        let ev = Event::new("health_check", "lb-7");
        assert!(!ev.serialize);
        assert_eq!(ev.max_times, Retries::Unbounded);
        assert!(ev.binding_key.is_none());
        assert!(ev.data.is_null());
    }

    #[test]
    fn payload_round_trip() {
        #[derive(Serialize, Deserialize, PartialEq, Debug)]
        struct Payload {
            tenant: String,
            ports: Vec<u16>,
        }

        let original = Payload {
            tenant: "blue".into(),
            ports: vec![80, 443],
        };
        let ev = Event::new("configure_lb", "lb-1")
            .try_with_data(&original)
            .unwrap();
        let back: Payload = ev.data_as().unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn payload_type_mismatch_is_an_error() {
        let ev = Event::new("configure_lb", "lb-1").with_data(json!("not a number"));
        let res: Result<u64, _> = ev.data_as();
        let err = res.unwrap_err();
        assert_eq!(err.as_label(), "controller_invalid_payload");
        assert!(err.to_string().contains("configure_lb"));
    }

    #[test]
    fn lifetime_id_is_recognized() {
        assert!(Event::new(EVENT_LIFE_TIMEOUT, "fw-1").is_lifetime());
        assert!(!Event::new("vpn_sync", "fw-1").is_lifetime());
    }
}
