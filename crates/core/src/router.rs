//! Router trait — chooses which agent acts next, or stops the run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agent::Outcome;
use crate::error::RouterError;
use crate::state::SharedState;

/// What a router decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "agent", rename_all = "snake_case")]
pub enum RouterDecision {
    /// Invoke the agent with this id
    Next(String),
    /// End the run
    Stop,
}

impl RouterDecision {
    pub fn next(agent_id: impl Into<String>) -> Self {
        Self::Next(agent_id.into())
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, Self::Stop)
    }
}

/// A registered agent as routers see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub id: String,
    #[serde(default)]
    pub description: String,
}

impl AgentInfo {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
        }
    }
}

/// Everything a router may look at when deciding.
#[derive(Debug, Clone, Copy)]
pub struct RouterContext<'a> {
    /// The input the run was started with
    pub input: &'a str,

    /// The run's state; turns are read-only here
    pub state: &'a SharedState,

    /// Number of agent invocations so far in this run
    pub call_count: usize,

    /// The most recent agent's outcome, `None` before the first invocation
    pub last_outcome: Option<&'a Outcome>,

    /// The agents registered in the pool, in registration order
    pub agents: &'a [AgentInfo],
}

impl RouterContext<'_> {
    /// Registered agent ids, in registration order.
    pub fn agent_ids(&self) -> impl Iterator<Item = &str> {
        self.agents.iter().map(|a| a.id.as_str())
    }

    pub fn has_agent(&self, id: &str) -> bool {
        self.agents.iter().any(|a| a.id == id)
    }
}

/// The core Router trait.
///
/// A router is consulted once before every agent invocation. It may be a
/// pure function of the context or a model-backed decision.
#[async_trait]
pub trait Router: Send + Sync {
    fn name(&self) -> &str;

    async fn decide(&self, ctx: &RouterContext<'_>) -> Result<RouterDecision, RouterError>;
}
