//! What a run hands back.

use ensemble_core::error::{AgentError, RouterError};
use ensemble_core::state::{SharedState, Turn};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// A failure that ends a run early. The state up to the failure is kept.
#[derive(Debug, Clone, Error)]
pub enum FatalError {
    /// The router named an agent the pool does not have.
    #[error("unknown agent: {agent_id}")]
    UnknownAgent { agent_id: String },

    #[error("agent {agent_id} failed: {source}")]
    AgentExecutionFailure {
        agent_id: String,
        #[source]
        source: AgentError,
    },

    #[error("router {router} failed: {source}")]
    RouterFailure {
        router: String,
        #[source]
        source: RouterError,
    },
}

/// Why a run ended.
#[derive(Debug, Clone)]
pub enum Termination {
    /// The router decided to stop.
    RouterStop,
    /// The pool's iteration bound was reached.
    IterationBoundReached,
    /// The caller's cancellation token fired.
    Cancelled,
    /// The run-level timeout elapsed.
    DeadlineExceeded,
    Fatal(FatalError),
}

impl Termination {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Stable snake_case name, used in events and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RouterStop => "router_stop",
            Self::IterationBoundReached => "iteration_bound_reached",
            Self::Cancelled => "cancelled",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Fatal(FatalError::UnknownAgent { .. }) => "unknown_agent",
            Self::Fatal(FatalError::AgentExecutionFailure { .. }) => "agent_execution_failure",
            Self::Fatal(FatalError::RouterFailure { .. }) => "router_failure",
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fatal(e) => write!(f, "{}: {e}", self.kind()),
            _ => f.write_str(self.kind()),
        }
    }
}

/// The outcome of [`Pool::run`](crate::Pool::run).
#[derive(Debug, Clone)]
pub struct RunResult {
    pub state: SharedState,
    pub termination: Termination,
    /// Output of the last turn, if any agent ran
    pub final_output: Option<String>,
    /// Non-fatal problems noticed during the run
    pub annotations: Vec<String>,
    pub call_count: usize,
}

impl RunResult {
    pub fn turns(&self) -> &[Turn] {
        self.state.turns()
    }

    pub fn is_fatal(&self) -> bool {
        self.termination.is_fatal()
    }

    /// A serializable summary for printing or logging.
    pub fn summary(&self) -> RunSummary<'_> {
        RunSummary {
            run_id: self.state.id(),
            termination: self.termination.to_string(),
            call_count: self.call_count,
            final_output: self.final_output.as_deref(),
            annotations: &self.annotations,
            turns: self.state.turns(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
    pub run_id: &'a str,
    pub termination: String,
    pub call_count: usize,
    pub final_output: Option<&'a str>,
    pub annotations: &'a [String],
    pub turns: &'a [Turn],
}

/// Errors building a pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("duplicate agent id: {0}")]
    DuplicateAgent(String),

    #[error("a pool needs at least one agent")]
    NoAgents,

    #[error("max_iterations must be greater than 0")]
    ZeroIterations,
}
