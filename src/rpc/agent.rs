//! # RPC agent wrapper: topic binding and periodic state reporting.
//!
//! [`RpcAgent`] binds a handler object to an externally reachable topic. The
//! transport itself (message bus, HTTP, whatever carries the calls)
//! is out of scope; this module specifies only the contract with the
//! controller:
//!
//! - agents are registered once, before
//!   [`Controller::start`](crate::Controller::start), and started together;
//! - inbound calls are routed through [`RpcAgent::call`];
//! - state reporting is driven by one shared fixed-interval task across all
//!   registered agents, not one timer per agent.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use serde_json::Value;
//! use eventvisor::{HandlerError, RpcAgent, RpcHandler};
//!
//! struct ConfigAgent;
//!
//! #[async_trait]
//! impl RpcHandler for ConfigAgent {
//!     fn topic(&self) -> &str { "device-config" }
//!
//!     async fn call(&self, method: &str, args: Value) -> Result<Value, HandlerError> {
//!         match method {
//!             "ping" => Ok(args),
//!             other => Err(HandlerError::failed(format!("unknown method {other:?}"))),
//!         }
//!     }
//! }
//!
//! let agent = RpcAgent::new(std::sync::Arc::new(ConfigAgent));
//! assert_eq!(agent.topic(), "device-config");
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::HandlerError;

/// Contract for an RPC-exposed handler object.
///
/// Implementations route inbound methods however they like (typically by
/// translating them into events posted to the controller handle they
/// captured at init).
#[async_trait]
pub trait RpcHandler: Send + Sync + 'static {
    /// Transport topic this handler is reachable on.
    fn topic(&self) -> &str;

    /// Handles one inbound call.
    async fn call(&self, method: &str, args: Value) -> Result<Value, HandlerError>;

    /// Periodic liveness/state report, driven by the controller's shared
    /// reporting task. Default: no-op.
    async fn report_state(&self) {}
}

/// A registered topic binding.
#[derive(Clone)]
pub struct RpcAgent {
    handler: Arc<dyn RpcHandler>,
}

impl RpcAgent {
    /// Wraps a handler for registration with the controller.
    pub fn new(handler: Arc<dyn RpcHandler>) -> Self {
        Self { handler }
    }

    /// Topic the wrapped handler is bound to.
    pub fn topic(&self) -> &str {
        self.handler.topic()
    }

    /// Routes one inbound call to the wrapped handler.
    pub async fn call(&self, method: &str, args: Value) -> Result<Value, HandlerError> {
        self.handler.call(method, args).await
    }

    /// One report_state invocation, isolated against panics.
    async fn report(&self) {
        if let Err(panic) = std::panic::AssertUnwindSafe(self.handler.report_state())
            .catch_unwind()
            .await
        {
            tracing::warn!(topic = self.topic(), ?panic, "report_state panicked");
        }
    }
}

/// Shared fixed-interval reporting task over all registered agents.
///
/// Spawned once by `Controller::start()`; agents report sequentially within
/// each interval (they share the controller's cooperative domain).
pub(crate) async fn report_loop(
    agents: Vec<RpcAgent>,
    interval: Duration,
    token: CancellationToken,
) {
    let mut ticker = time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first interval tick completes immediately; skip it so reports
    // start one full interval after startup.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                for agent in &agents {
                    agent.report().await;
                }
            }
        }
    }
    tracing::debug!(agents = agents.len(), "state reporting stopped");
}
