//! Agent trait and the outcome of one agent turn.
//!
//! Every agent variant (model-backed, closure-backed, ...) is the same
//! capability: turn an input plus shared state into an [`Outcome`]. Variants
//! differ by configuration, not by type hierarchy.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::state::{StateHandle, Turn};

/// Side-channel information attached to an outcome.
///
/// Signals are recorded on the turn for routers and later agents to read.
/// The scheduler itself never branches on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Signal {
    /// The agent invoked a tool during the turn
    ToolInvoked {
        tool: String,
        arguments: serde_json::Value,
        output: String,
        success: bool,
    },
    /// Long-term memory contributed facts to the prompt
    MemoryRecalled { count: usize },
    /// Long-term memory could not be consulted; the turn went ahead without it
    MemoryUnavailable { reason: String },
    /// Free-form annotation
    Note { message: String },
}

/// What an agent returns from one turn.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Outcome {
    pub output: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signals: Vec<Signal>,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Outcome {
    /// An outcome carrying only text.
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            ..Self::default()
        }
    }

    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.signals.push(signal);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Names of tools invoked during the turn, in call order.
    pub fn tools_invoked(&self) -> Vec<&str> {
        self.signals
            .iter()
            .filter_map(|s| match s {
                Signal::ToolInvoked { tool, .. } => Some(tool.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// The core Agent trait.
///
/// The pool depends on nothing but this.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Identifier, unique within a pool.
    fn id(&self) -> &str;

    /// What this agent is for (shown to routing agents).
    fn description(&self) -> &str {
        ""
    }

    /// Execute one turn.
    async fn produce(&self, input: &str, state: &mut StateHandle<'_>) -> Result<Outcome, AgentError>;

    /// Called by the pool after this agent's turn has been appended.
    ///
    /// Must not fail the run; implementations log and swallow their errors.
    async fn after_turn(&self, _turn: &Turn, _run_id: &str) {}
}
