//! # Event model for the eventvisor runtime.
//!
//! - [`Event`]: one unit of work (handler id, payload, routing metadata);
//! - [`Retries`]: explicit bounded/unbounded timer-dispatch budget;
//! - [`WorkerId`]: pool index an event is pinned to after routing;
//! - [`EVENT_LIFE_TIMEOUT`]: reserved id for fixed-lifetime expiry tracking.

mod event;
mod retries;

pub use event::{Event, WorkerId, EVENT_LIFE_TIMEOUT};
pub use retries::Retries;
