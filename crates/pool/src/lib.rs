//! Multi-agent scheduling for Ensemble.
//!
//! A [`Pool`] owns a set of agents and a [`Router`](ensemble_core::router::Router).
//! Each run invokes one agent at a time over a shared, append-only history
//! until the router stops, the iteration bound is reached, the run is
//! cancelled or times out, or something fails.
//!
//! Routers:
//! - [`RoundRobinRouter`]: each agent once, in order
//! - [`FnRouter`]: a caller-supplied function of the run so far
//! - [`RoutingAgent`]: a model picks the next agent

pub mod pool;
pub mod result;
pub mod router;
pub mod routing_agent;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use pool::{FailurePolicy, Pool, PoolBuilder, DEFAULT_MAX_ITERATIONS, NEXT_INPUT_VAR};
pub use result::{FatalError, PoolError, RunResult, RunSummary, Termination};
pub use router::{FnRouter, RoundRobinRouter};
pub use routing_agent::{parse_decision, RoutingAgent};
