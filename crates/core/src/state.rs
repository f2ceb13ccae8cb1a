//! Shared run state: the append-only turn history and the variable map.
//!
//! A [`SharedState`] is owned by the pool for the duration of a run. Agents
//! never see it directly; they get a [`StateHandle`], which reads turns and
//! reads/writes variables but cannot append or rewrite history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::agent::{Outcome, Signal};

/// One completed agent invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Position in the run, starting at 0
    pub index: usize,

    /// Which agent produced this turn
    pub agent_id: String,

    /// What the agent was given
    pub input: String,

    /// What the agent returned
    pub output: String,

    /// When the turn was recorded
    pub timestamp: DateTime<Utc>,

    /// Side-channel signals from the outcome (tool calls, memory recall, ...)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signals: Vec<Signal>,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Turn {
    /// Build a turn from an agent's outcome. The index is assigned on append.
    pub fn from_outcome(agent_id: impl Into<String>, input: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            index: 0,
            agent_id: agent_id.into(),
            input: input.into(),
            output: outcome.output,
            timestamp: Utc::now(),
            signals: outcome.signals,
            metadata: outcome.metadata,
        }
    }
}

/// A pointer to a turn in a specific run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRef {
    pub run_id: String,
    pub index: usize,
    pub agent_id: String,
}

/// Ordered turn history plus auxiliary variables for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedState {
    id: String,
    turns: Vec<Turn>,
    #[serde(default)]
    variables: BTreeMap<String, serde_json::Value>,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            turns: Vec::new(),
            variables: BTreeMap::new(),
        }
    }

    /// Run identifier, used to reference turns from long-term memory.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Append a turn. Its index is set to its position, so the sequence
    /// stays dense and ordered no matter what the caller put there.
    pub fn append(&mut self, mut turn: Turn) -> &Turn {
        turn.index = self.turns.len();
        self.turns.push(turn);
        &self.turns[self.turns.len() - 1]
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn get_variable(&self, key: &str) -> Option<&serde_json::Value> {
        self.variables.get(key)
    }

    /// Set a variable, returning the previous value.
    pub fn set_variable(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Option<serde_json::Value> {
        self.variables.insert(key.into(), value.into())
    }

    pub fn remove_variable(&mut self, key: &str) -> Option<serde_json::Value> {
        self.variables.remove(key)
    }

    pub fn variables(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.variables
    }

    /// Replace every variable at once, returning the previous set.
    pub fn replace_variables(&mut self, variables: BTreeMap<String, serde_json::Value>) -> BTreeMap<String, serde_json::Value> {
        std::mem::replace(&mut self.variables, variables)
    }

    pub fn turn_ref(&self, index: usize) -> Option<TurnRef> {
        self.turns.get(index).map(|t| TurnRef {
            run_id: self.id.clone(),
            index: t.index,
            agent_id: t.agent_id.clone(),
        })
    }

    /// Render the history as `agent: output` lines.
    pub fn transcript(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("{}: {}", t.agent_id, t.output))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Borrow the state as an agent would see it.
    pub fn handle(&mut self) -> StateHandle<'_> {
        StateHandle { state: self }
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

/// An agent's view of the shared state during one invocation.
pub struct StateHandle<'a> {
    state: &'a mut SharedState,
}

impl StateHandle<'_> {
    pub fn run_id(&self) -> &str {
        self.state.id()
    }

    pub fn turns(&self) -> &[Turn] {
        self.state.turns()
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.state.last_turn()
    }

    pub fn transcript(&self) -> String {
        self.state.transcript()
    }

    pub fn get_variable(&self, key: &str) -> Option<&serde_json::Value> {
        self.state.get_variable(key)
    }

    pub fn set_variable(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Option<serde_json::Value> {
        self.state.set_variable(key, value)
    }

    pub fn remove_variable(&mut self, key: &str) -> Option<serde_json::Value> {
        self.state.remove_variable(key)
    }
}
