//! Provider router — selects the correct LLM provider based on config.
//!
//! Handles provider creation and routing requests to the right backend.

use std::collections::HashMap;
use std::sync::Arc;
use ensemble_config::AppConfig;
use ensemble_core::embedding::EmbeddingMethod;
use ensemble_core::provider::Provider;
use crate::openai_compat::OpenAiCompatProvider;

/// Routes LLM requests to the correct provider.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
}

impl ProviderRouter {
    /// Create a new router with a default provider.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Get the default provider.
    pub fn default(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// Resolve a model string to a provider and the model name to send.
    ///
    /// `"ollama/llama3.2"` selects the registered `ollama` provider with model
    /// `llama3.2`; anything without a known provider prefix goes to the
    /// default provider unchanged.
    pub fn resolve(&self, model: &str) -> Option<(Arc<dyn Provider>, String)> {
        if let Some((prefix, rest)) = model.split_once('/') {
            if let Some(provider) = self.get(prefix) {
                return Some((provider, rest.to_string()));
            }
        }

        self.default().map(|p| (p, model.to_string()))
    }

    /// List all registered provider names.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// Build providers from configuration.
pub fn build_from_config(config: &AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.default_provider);

    for (name, provider_config) in &config.providers {
        let api_key = provider_config
            .api_key
            .clone()
            .or_else(|| config.api_key.clone())
            .unwrap_or_default();

        let base_url = provider_config
            .api_url
            .clone()
            .unwrap_or_else(|| default_base_url(name));

        router.register(
            name.clone(),
            Arc::new(OpenAiCompatProvider::new(name, &base_url, &api_key)),
        );
    }

    // Ensure the default provider exists (even if not explicitly configured)
    if router.get(&config.default_provider).is_none() {
        let api_key = config.api_key.clone().unwrap_or_default();
        let base_url = default_base_url(&config.default_provider);
        router.register(
            config.default_provider.clone(),
            Arc::new(OpenAiCompatProvider::new(
                &config.default_provider,
                &base_url,
                &api_key,
            )),
        );
    }

    router
}

/// The provider that serves embeddings for a model-backed embedding method.
///
/// `local` uses the configured `ollama` provider (or a default Ollama
/// endpoint); `remote` uses the default provider. `hash` needs no provider.
pub fn embedding_provider(config: &AppConfig, router: &ProviderRouter) -> Option<Arc<dyn Provider>> {
    match config.memory.embedding_method {
        EmbeddingMethod::Hash => None,
        EmbeddingMethod::Local => Some(
            router
                .get("ollama")
                .unwrap_or_else(|| Arc::new(OpenAiCompatProvider::ollama(None))),
        ),
        EmbeddingMethod::Remote => router.default(),
    }
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "lmstudio" => "http://localhost:1234/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
