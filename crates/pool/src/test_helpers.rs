//! Scripted providers and agents for pool tests.

use async_trait::async_trait;
use ensemble_core::agent::{Agent, Outcome};
use ensemble_core::error::{AgentError, ProviderError};
use ensemble_core::message::Message;
use ensemble_core::provider::{Provider, ProviderRequest, ProviderResponse};
use ensemble_core::state::{StateHandle, Turn};
use std::sync::Mutex;
use std::time::Duration;

/// Returns scripted completions in order and records every request.
pub struct ScriptedProvider {
    replies: Mutex<Vec<Result<String, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().rev().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Err(ProviderError::NotConfigured("script exhausted".into())))?;
        Ok(ProviderResponse {
            message: Message::assistant(reply),
            usage: None,
            model,
        })
    }
}

/// Sleeps before answering; used with paused time.
pub struct SleepyAgent {
    pub id: String,
    pub delay: Duration,
}

impl SleepyAgent {
    pub fn new(id: &str, delay: Duration) -> Self {
        Self {
            id: id.into(),
            delay,
        }
    }
}

#[async_trait]
impl Agent for SleepyAgent {
    fn id(&self) -> &str {
        &self.id
    }

    async fn produce(&self, input: &str, _state: &mut StateHandle<'_>) -> Result<Outcome, AgentError> {
        tokio::time::sleep(self.delay).await;
        Ok(Outcome::text(format!("slept on {input}")))
    }
}

/// Echoes its input and remembers every turn handed to `after_turn`.
#[derive(Default)]
pub struct RecordingAgent {
    pub seen: Mutex<Vec<(String, usize)>>,
}

#[async_trait]
impl Agent for RecordingAgent {
    fn id(&self) -> &str {
        "recorder"
    }

    fn description(&self) -> &str {
        "Echoes and records"
    }

    async fn produce(&self, input: &str, _state: &mut StateHandle<'_>) -> Result<Outcome, AgentError> {
        Ok(Outcome::text(input))
    }

    async fn after_turn(&self, turn: &Turn, run_id: &str) {
        self.seen.lock().unwrap().push((run_id.to_string(), turn.index));
    }
}
