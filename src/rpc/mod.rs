//! # RPC-facing surface.
//!
//! Thin adapter over an external messaging transport: [`RpcAgent`] binds a
//! [`RpcHandler`] to a topic and the controller drives a single shared
//! `report_state` interval across all registered agents.

mod agent;

pub use agent::{RpcAgent, RpcHandler};

pub(crate) use agent::report_loop;
