//! Model-backed agent.
//!
//! Each turn the agent recalls related facts from long-term memory, builds a
//! prompt from its persona, tools, memories and the shared history, then
//! loops over the model:
//!
//! 1. **Call** the model with the conversation so far
//! 2. **If the reply is a tool call**: run it, feed the result back, repeat
//! 3. **Otherwise**: the reply is the turn's output
//!
//! The loop stops after `max_steps` model calls. If the last call asked for
//! a tool, that tool's output becomes the turn's output.

use async_trait::async_trait;
use ensemble_core::agent::{Agent, Outcome, Signal};
use ensemble_core::error::{AgentError, ToolError};
use ensemble_core::memory::MemoryRecord;
use ensemble_core::provider::{Provider, ProviderRequest};
use ensemble_core::state::{StateHandle, Turn};
use ensemble_core::tool::ToolRegistry;
use ensemble_memory::LongTermMemory;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::prompt::{self, PromptParts};
use crate::tool_call::parse_tool_call;

const DEFAULT_PERSONA: &str = "You are a helpful assistant.";

/// An agent whose output comes from a language model.
pub struct LlmAgent {
    id: String,
    description: String,
    persona: String,
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    tools: Arc<ToolRegistry>,
    /// Model calls allowed per turn
    max_steps: usize,
    memory: Option<Arc<LongTermMemory>>,
    /// Facts recalled per turn
    recall_limit: usize,
}

impl LlmAgent {
    pub fn new(id: impl Into<String>, provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            persona: DEFAULT_PERSONA.into(),
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            tools: Arc::new(ToolRegistry::new()),
            max_steps: 5,
            memory: None,
            recall_limit: 5,
        }
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = persona.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    /// Set the model calls allowed per turn (at least one).
    pub fn with_max_steps(mut self, max: usize) -> Self {
        self.max_steps = max.max(1);
        self
    }

    /// Attach long-term memory for recall and, if enabled there, extraction.
    pub fn with_memory(mut self, memory: Arc<LongTermMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_recall_limit(mut self, limit: usize) -> Self {
        self.recall_limit = limit;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn persona(&self) -> &str {
        &self.persona
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Recall facts for the input. A memory failure costs the turn its
    /// memories, never the turn itself.
    async fn recall(&self, input: &str) -> (Vec<MemoryRecord>, Option<Signal>) {
        let Some(memory) = &self.memory else {
            return (Vec::new(), None);
        };
        if self.recall_limit == 0 {
            return (Vec::new(), None);
        }

        match memory.retrieve(input, self.recall_limit).await {
            Ok(records) => {
                if records.is_empty() {
                    return (records, None);
                }
                debug!(agent = %self.id, count = records.len(), "Recalled memories");
                let count = records.len();
                (records, Some(Signal::MemoryRecalled { count }))
            }
            Err(e) => {
                warn!(agent = %self.id, "Memory recall failed: {e}");
                (
                    Vec::new(),
                    Some(Signal::MemoryUnavailable {
                        reason: e.to_string(),
                    }),
                )
            }
        }
    }
}

#[async_trait]
impl Agent for LlmAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn produce(&self, input: &str, state: &mut StateHandle<'_>) -> Result<Outcome, AgentError> {
        let (memories, recall_signal) = self.recall(input).await;
        let mut outcome = Outcome::default();
        outcome.signals.extend(recall_signal);

        let transcript = state.transcript();
        let mut messages = prompt::build_messages(&PromptParts {
            persona: &self.persona,
            tools: &self.tools,
            memories: &memories,
            transcript: &transcript,
            input,
        });

        info!(agent = %self.id, model = %self.model, tools = self.tools.len(), "Agent turn starting");

        let mut last_tool_output = None;
        for step in 1..=self.max_steps {
            let mut request = ProviderRequest::new(&self.model, messages.clone()).with_temperature(self.temperature);
            request.max_tokens = self.max_tokens;

            let response = self.provider.complete(request).await?;
            let reply = response.message.content.clone();
            if reply.trim().is_empty() {
                return Err(AgentError::MalformedResponse(format!(
                    "{} returned an empty reply",
                    self.provider.name()
                )));
            }

            let Some(call) = parse_tool_call(&reply) else {
                debug!(agent = %self.id, step, "Model answered");
                outcome.output = reply;
                return Ok(outcome.with_metadata("model", response.model).with_metadata("steps", step));
            };

            if self.tools.get(&call.name).is_none() {
                return Err(ToolError::NotFound(call.name).into());
            }

            debug!(agent = %self.id, step, tool = %call.name, "Invoking tool");
            let result = self.tools.execute(&call).await?;
            messages.push(response.message);
            messages.push(prompt::tool_result_message(&call.name, &result.output, result.success));
            outcome.signals.push(Signal::ToolInvoked {
                tool: call.name,
                arguments: call.arguments,
                output: result.output.clone(),
                success: result.success,
            });
            last_tool_output = Some(result.output);
        }

        info!(agent = %self.id, max_steps = self.max_steps, "Step limit reached after a tool call");
        outcome.output = last_tool_output.unwrap_or_default();
        Ok(outcome
            .with_metadata("model", self.model.clone())
            .with_metadata("steps", self.max_steps))
    }

    async fn after_turn(&self, turn: &Turn, run_id: &str) {
        if let Some(memory) = &self.memory {
            memory.observe_turn(turn, run_id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{make_text_response, CountingTool, FailingTool, SequentialMockProvider};
    use ensemble_core::embedding::EmbeddingProvider;
    use ensemble_core::error::{MemoryError, ProviderError};
    use ensemble_core::memory::VectorStore;
    use ensemble_core::message::Role;
    use ensemble_core::state::SharedState;
    use ensemble_memory::{ExchangeExtractor, HashEmbedder, InMemoryVectorStore};

    fn registry_with_counter() -> (Arc<ToolRegistry>, Arc<std::sync::atomic::AtomicUsize>) {
        let tool = CountingTool::new();
        let calls = tool.calls();
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(tool));
        (Arc::new(registry), calls)
    }

    fn memory() -> Arc<LongTermMemory> {
        Arc::new(LongTermMemory::new(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(HashEmbedder::default()),
        ))
    }

    #[tokio::test]
    async fn plain_reply_becomes_output() {
        let provider = Arc::new(SequentialMockProvider::single_text("Lisbon has about 545,000 people."));
        let agent = LlmAgent::new("researcher", provider.clone(), "mock-model");
        let mut state = SharedState::new();

        let outcome = agent.produce("Population of Lisbon?", &mut state.handle()).await.unwrap();
        assert_eq!(outcome.output, "Lisbon has about 545,000 people.");
        assert!(outcome.signals.is_empty());
        assert_eq!(outcome.metadata["steps"], 1);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn tool_call_runs_and_result_is_fed_back() {
        let (tools, calls) = registry_with_counter();
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_text_response(r#"{"tool": "counter", "args": {"by": 2}}"#),
            make_text_response("The counter now reads 2."),
        ]));
        let agent = LlmAgent::new("worker", provider.clone(), "mock-model").with_tools(tools);
        let mut state = SharedState::new();

        let outcome = agent.produce("bump the counter", &mut state.handle()).await.unwrap();
        assert_eq!(outcome.output, "The counter now reads 2.");
        assert_eq!(outcome.tools_invoked(), vec!["counter"]);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);

        let second = &provider.requests()[1];
        let last = second.messages.last().unwrap();
        assert_eq!(last.role, Role::Tool);
        assert!(last.content.contains("Tool 'counter' returned:\n2"));
    }

    #[tokio::test]
    async fn step_limit_after_tool_returns_tool_output() {
        let (tools, calls) = registry_with_counter();
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_text_response(r#"{"tool": "counter", "args": {"by": 1}}"#),
            make_text_response(r#"{"tool": "counter", "args": {"by": 1}}"#),
        ]));
        let agent = LlmAgent::new("worker", provider.clone(), "mock-model")
            .with_tools(tools)
            .with_max_steps(2);
        let mut state = SharedState::new();

        let outcome = agent.produce("count twice", &mut state.handle()).await.unwrap();
        assert_eq!(outcome.output, "2");
        assert_eq!(outcome.tools_invoked(), vec!["counter", "counter"]);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn unknown_tool_is_a_tool_error() {
        let provider = Arc::new(SequentialMockProvider::single_text(
            r#"{"tool": "teleport", "args": {}}"#,
        ));
        let agent = LlmAgent::new("worker", provider, "mock-model");
        let mut state = SharedState::new();

        let err = agent.produce("go", &mut state.handle()).await.unwrap_err();
        assert!(matches!(err, AgentError::Tool(ToolError::NotFound(ref name)) if name == "teleport"));
    }

    #[tokio::test]
    async fn failing_tool_is_a_tool_error() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(FailingTool));
        let provider = Arc::new(SequentialMockProvider::single_text(r#"{"tool": "broken", "args": {}}"#));
        let agent = LlmAgent::new("worker", provider, "mock-model").with_tools(Arc::new(registry));
        let mut state = SharedState::new();

        let err = agent.produce("try it", &mut state.handle()).await.unwrap_err();
        assert!(matches!(err, AgentError::Tool(ToolError::ExecutionFailed { .. })));
    }

    #[tokio::test]
    async fn provider_failure_is_typed() {
        let provider = Arc::new(SequentialMockProvider::failing(ProviderError::Timeout("30s".into())));
        let agent = LlmAgent::new("worker", provider, "mock-model");
        let mut state = SharedState::new();

        let err = agent.produce("hello", &mut state.handle()).await.unwrap_err();
        assert!(matches!(err, AgentError::Provider(ProviderError::Timeout(_))));
    }

    #[tokio::test]
    async fn empty_reply_is_malformed() {
        let provider = Arc::new(SequentialMockProvider::single_text("   "));
        let agent = LlmAgent::new("worker", provider, "mock-model");
        let mut state = SharedState::new();

        let err = agent.produce("hello", &mut state.handle()).await.unwrap_err();
        assert!(matches!(err, AgentError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn prompt_carries_persona_history_and_memories() {
        let memory = memory();
        memory.store("The user's favorite city is Lisbon").await.unwrap();

        let provider = Arc::new(SequentialMockProvider::single_text("Noted."));
        let agent = LlmAgent::new("writer", provider.clone(), "mock-model")
            .with_persona("You write travel notes.")
            .with_memory(memory);

        let mut state = SharedState::new();
        state.append(Turn::from_outcome("planner", "plan", Outcome::text("Visit Lisbon in May")));

        let outcome = agent
            .produce("Write about my favorite city", &mut state.handle())
            .await
            .unwrap();
        assert!(matches!(outcome.signals[0], Signal::MemoryRecalled { count: 1 }));

        let request = &provider.requests()[0];
        let system = &request.messages[0].content;
        assert!(system.starts_with("You write travel notes."));
        assert!(system.contains("favorite city is Lisbon"));
        assert!(system.contains("planner: Visit Lisbon in May"));
        assert_eq!(request.messages[1].content, "Write about my favorite city");
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl EmbeddingProvider for BrokenEmbedder {
        fn name(&self) -> &str {
            "broken"
        }
        fn dimension(&self) -> usize {
            4
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, MemoryError> {
            Err(MemoryError::EmbeddingFailed("offline".into()))
        }
    }

    #[tokio::test]
    async fn recall_failure_degrades_to_no_memories() {
        let memory = Arc::new(LongTermMemory::new(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(BrokenEmbedder),
        ));
        let provider = Arc::new(SequentialMockProvider::single_text("Still here."));
        let agent = LlmAgent::new("worker", provider, "mock-model").with_memory(memory);
        let mut state = SharedState::new();

        let outcome = agent.produce("hello", &mut state.handle()).await.unwrap();
        assert_eq!(outcome.output, "Still here.");
        assert!(matches!(outcome.signals[0], Signal::MemoryUnavailable { .. }));
    }

    #[tokio::test]
    async fn after_turn_extracts_when_enabled() {
        let store = Arc::new(InMemoryVectorStore::new());
        let memory = Arc::new(
            LongTermMemory::new(store.clone(), Arc::new(HashEmbedder::default()))
                .with_auto_extract(Arc::new(ExchangeExtractor::default())),
        );
        let provider = Arc::new(SequentialMockProvider::single_text("unused"));
        let agent = LlmAgent::new("assistant", provider, "mock-model").with_memory(memory.clone());

        let turn = Turn::from_outcome(
            "assistant",
            "Which editor do I use at work?",
            Outcome::text("You use Helix at work."),
        );
        agent.after_turn(&turn, "run-1").await;
        assert_eq!(store.count().await.unwrap(), 1);

        let recalled = memory.retrieve("editor at work", 1).await.unwrap();
        let source = recalled[0].source.as_ref().unwrap();
        assert_eq!(source.run_id, "run-1");
        assert_eq!(source.agent_id, "assistant");
    }

    #[tokio::test]
    async fn after_turn_without_extraction_stores_nothing() {
        let store = Arc::new(InMemoryVectorStore::new());
        let memory = Arc::new(LongTermMemory::new(store.clone(), Arc::new(HashEmbedder::default())));
        let provider = Arc::new(SequentialMockProvider::single_text("unused"));
        let agent = LlmAgent::new("assistant", provider, "mock-model").with_memory(memory);

        let turn = Turn::from_outcome("assistant", "a question long enough", Outcome::text("an answer long enough"));
        agent.after_turn(&turn, "run-1").await;
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[test]
    fn max_steps_is_at_least_one() {
        let provider = Arc::new(SequentialMockProvider::new(vec![]));
        let agent = LlmAgent::new("a", provider, "m").with_max_steps(0);
        assert_eq!(agent.max_steps(), 1);
    }
}
