//! Shared test helpers for agent tests.

use async_trait::async_trait;
use ensemble_core::error::{ProviderError, ToolError};
use ensemble_core::message::Message;
use ensemble_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use ensemble_core::tool::{Tool, ToolResult};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue.
/// Panics if more calls are made than responses provided.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self::scripted(responses.into_iter().map(Ok).collect())
    }

    pub fn scripted(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider that returns a single text response.
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    /// A provider whose first call fails.
    pub fn failing(error: ProviderError) -> Self {
        Self::scripted(vec![Err(error)])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let call = requests.len();

        if call >= responses.len() {
            panic!(
                "SequentialMockProvider: no more responses (call #{}, have {})",
                call,
                responses.len()
            );
        }

        requests.push(request);
        responses[call].clone()
    }
}

/// Create a simple text response.
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// Adds `args.by` (default 1) to a running total and returns the total.
pub struct CountingTool {
    total: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl CountingTool {
    pub fn new() -> Self {
        Self {
            total: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl Tool for CountingTool {
    fn name(&self) -> &str {
        "counter"
    }

    fn description(&self) -> &str {
        "Adds to a running counter and returns the new total"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "by": { "type": "integer" } }
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let by = arguments.get("by").and_then(|v| v.as_u64()).unwrap_or(1) as usize;
        self.calls.fetch_add(1, Ordering::SeqCst);
        let total = self.total.fetch_add(by, Ordering::SeqCst) + by;
        Ok(ToolResult::ok(total.to_string()))
    }
}

/// Always fails.
pub struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "broken"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: "broken".into(),
            reason: "disk on fire".into(),
        })
    }
}
