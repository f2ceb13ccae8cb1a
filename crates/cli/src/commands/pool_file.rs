//! Pool definition files.
//!
//! ```toml
//! max_iterations = 4
//!
//! [router]
//! kind = "routing_agent"      # or "round_robin" (default)
//! persona = "You decide who acts next."
//! candidates = ["researcher"] # optional, defaults to every agent
//!
//! [[agents]]
//! name = "researcher"
//! description = "Finds facts"
//! persona = "You are a careful researcher."
//! model = "ollama/llama3.2"   # optional, defaults to the configured model
//! max_steps = 3
//! memory = true
//! tools = ["calculator", "memory_search"]
//! ```

use ensemble_agent::LlmAgent;
use ensemble_config::AppConfig;
use ensemble_memory::LongTermMemory;
use ensemble_pool::{FailurePolicy, Pool, RoundRobinRouter, RoutingAgent};
use ensemble_providers::ProviderRouter;
use ensemble_tools::{builtin_registry, BUILTIN_TOOLS};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolFile {
    #[serde(default)]
    pub max_iterations: Option<usize>,

    #[serde(default)]
    pub router: RouterSpec,

    pub agents: Vec<AgentSpec>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouterSpec {
    #[default]
    RoundRobin,
    RoutingAgent {
        #[serde(default)]
        persona: Option<String>,
        #[serde(default)]
        model: Option<String>,
        /// Agent ids the router may pick from; empty means all
        #[serde(default)]
        candidates: Vec<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub persona: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_steps: Option<usize>,
    /// Give the agent the configured long-term memory
    #[serde(default)]
    pub memory: bool,
    /// Built-in tools by name
    #[serde(default)]
    pub tools: Vec<String>,
}

impl PoolFile {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read pool file {}: {e}", path.display()))?;
        Self::parse(&content).map_err(|e| format!("Invalid pool file {}: {e}", path.display()).into())
    }

    pub fn parse(content: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let file: Self = toml::from_str(content)?;
        file.validate()?;
        Ok(file)
    }

    fn validate(&self) -> Result<(), String> {
        if self.agents.is_empty() {
            return Err("at least one [[agents]] entry is required".into());
        }
        if self.max_iterations == Some(0) {
            return Err("max_iterations must be > 0".into());
        }
        let mut seen = HashSet::new();
        for agent in &self.agents {
            if agent.name.trim().is_empty() {
                return Err("agent names must not be empty".into());
            }
            if !seen.insert(agent.name.as_str()) {
                return Err(format!("duplicate agent name '{}'", agent.name));
            }
            if let Some(tool) = agent.tools.iter().find(|t| !BUILTIN_TOOLS.contains(&t.as_str())) {
                return Err(format!(
                    "agent '{}' names unknown tool '{tool}' (available: {})",
                    agent.name,
                    BUILTIN_TOOLS.join(", ")
                ));
            }
        }
        if let RouterSpec::RoutingAgent { candidates, .. } = &self.router {
            if let Some(unknown) = candidates.iter().find(|c| !seen.contains(c.as_str())) {
                return Err(format!("router candidate '{unknown}' is not a defined agent"));
            }
        }
        Ok(())
    }

    /// Whether any agent asks for long-term memory, directly or through `memory_search`.
    pub fn wants_memory(&self) -> bool {
        self.agents
            .iter()
            .any(|a| a.memory || a.tools.iter().any(|t| t == "memory_search"))
    }
}

/// Build a pool from a definition, filling gaps from the configuration.
///
/// `max_iterations` wins over the file, which wins over the config.
pub fn build_pool(
    file: &PoolFile,
    config: &AppConfig,
    providers: &ProviderRouter,
    memory: Option<Arc<LongTermMemory>>,
    max_iterations: Option<usize>,
) -> Result<Pool, Box<dyn std::error::Error>> {
    let failure_policy = match config.pool.retry_attempts {
        0 => FailurePolicy::FailFast,
        attempts => FailurePolicy::Retry { attempts },
    };
    let mut builder = Pool::builder()
        .max_iterations(
            max_iterations
                .or(file.max_iterations)
                .unwrap_or(config.pool.max_iterations),
        )
        .failure_policy(failure_policy);
    if let Some(timeout) = config.pool.run_timeout() {
        builder = builder.run_timeout(timeout);
    }
    if let Some(timeout) = config.pool.agent_timeout() {
        builder = builder.agent_timeout(timeout);
    }

    for spec in &file.agents {
        let requested = spec.model.as_deref().unwrap_or(&config.default_model);
        let (provider, model) = providers
            .resolve(requested)
            .ok_or_else(|| format!("No provider available for model '{requested}'"))?;

        let mut agent = LlmAgent::new(&spec.name, provider, model)
            .with_description(&spec.description)
            .with_temperature(spec.temperature.unwrap_or(config.default_temperature))
            .with_recall_limit(config.memory.recall_limit);
        if let Some(persona) = &spec.persona {
            agent = agent.with_persona(persona);
        }
        if let Some(max_steps) = spec.max_steps {
            agent = agent.with_max_steps(max_steps);
        }
        if spec.memory {
            let memory = memory
                .clone()
                .ok_or_else(|| format!("Agent '{}' wants memory but none was opened", spec.name))?;
            agent = agent.with_memory(memory);
        }
        if !spec.tools.is_empty() {
            let tools = builtin_registry(&spec.tools, memory.clone())
                .map_err(|e| format!("Agent '{}': {e}", spec.name))?;
            agent = agent.with_tools(Arc::new(tools));
        }
        builder = builder.agent(agent);
    }

    builder = match &file.router {
        RouterSpec::RoundRobin => builder.router(RoundRobinRouter::new()),
        RouterSpec::RoutingAgent { persona, model, candidates } => {
            let requested = model.as_deref().unwrap_or(&config.default_model);
            let (provider, model) = providers
                .resolve(requested)
                .ok_or_else(|| format!("No provider available for router model '{requested}'"))?;
            let mut router = RoutingAgent::new("router", provider, model);
            if let Some(persona) = persona {
                router = router.with_persona(persona);
            }
            if !candidates.is_empty() {
                router = router.with_candidates(candidates.iter().cloned());
            }
            builder.router(router)
        }
    };

    Ok(builder.build()?)
}
