//! Closure-backed agent for deterministic pipeline steps.

use async_trait::async_trait;
use ensemble_core::agent::{Agent, Outcome};
use ensemble_core::error::AgentError;
use ensemble_core::state::StateHandle;

type Handler = dyn Fn(&str, &mut StateHandle<'_>) -> Result<Outcome, AgentError> + Send + Sync;

/// An agent whose turn is a plain function of the input and shared state.
pub struct FnAgent {
    id: String,
    description: String,
    handler: Box<Handler>,
}

impl FnAgent {
    pub fn new<F>(id: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&str, &mut StateHandle<'_>) -> Result<Outcome, AgentError> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            description: String::new(),
            handler: Box::new(handler),
        }
    }

    /// An agent that maps its input to an output and nothing else.
    pub fn from_text<F>(id: impl Into<String>, map: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self::new(id, move |input, _state| Ok(Outcome::text(map(input))))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[async_trait]
impl Agent for FnAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn produce(&self, input: &str, state: &mut StateHandle<'_>) -> Result<Outcome, AgentError> {
        (self.handler)(input, state)
    }
}
