//! Scripted providers for memory tests.

use async_trait::async_trait;
use ensemble_core::error::ProviderError;
use ensemble_core::message::Message;
use ensemble_core::provider::*;
use std::sync::Mutex;

/// Returns the same embedding for every input, or fails every call.
///
/// Every request is recorded.
pub struct FixedEmbeddingProvider {
    vector: Option<Vec<f32>>,
    requests: Mutex<Vec<EmbeddingRequest>>,
}

impl FixedEmbeddingProvider {
    pub fn new(vector: Vec<f32>) -> Self {
        Self {
            vector: Some(vector),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            vector: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<EmbeddingRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for FixedEmbeddingProvider {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::NotConfigured("completion not scripted".into()))
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        let vector = self
            .vector
            .clone()
            .ok_or_else(|| ProviderError::Network("connection refused".into()))?;
        Ok(EmbeddingResponse {
            embeddings: request.inputs.iter().map(|_| vector.clone()).collect(),
            model: request.model,
            usage: None,
        })
    }
}

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
