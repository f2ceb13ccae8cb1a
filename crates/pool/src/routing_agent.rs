//! Model-backed router.
//!
//! The routing agent shows a model the task, the candidate agents and the
//! history so far, and asks for the next agent's name or `STOP`.

use async_trait::async_trait;
use ensemble_core::error::RouterError;
use ensemble_core::message::Message;
use ensemble_core::provider::{Provider, ProviderRequest};
use ensemble_core::router::{Router, RouterContext, RouterDecision};
use std::sync::Arc;
use tracing::debug;

const STOP_TOKENS: [&str; 2] = ["STOP", "DONE"];

/// A router whose decision comes from a language model.
pub struct RoutingAgent {
    name: String,
    provider: Arc<dyn Provider>,
    model: String,
    persona: String,
    temperature: f32,
    /// Candidate ids; empty means every agent in the pool
    candidates: Vec<String>,
}

impl RoutingAgent {
    pub fn new(name: impl Into<String>, provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider,
            model: model.into(),
            persona: "You are a router that decides which agent should act next based on the conversation history."
                .into(),
            temperature: 0.0,
            candidates: Vec::new(),
        }
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = persona.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Restrict the choice to these agent ids.
    pub fn with_candidates<I, S>(mut self, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.candidates = candidates.into_iter().map(Into::into).collect();
        self
    }

    fn candidate_ids(&self, ctx: &RouterContext<'_>) -> Vec<String> {
        if self.candidates.is_empty() {
            ctx.agent_ids().map(str::to_string).collect()
        } else {
            self.candidates.clone()
        }
    }

    fn build_messages(&self, ctx: &RouterContext<'_>, candidates: &[String]) -> Vec<Message> {
        let listing = candidates
            .iter()
            .map(|id| {
                let description = ctx
                    .agents
                    .iter()
                    .find(|a| &a.id == id)
                    .map(|a| a.description.as_str())
                    .filter(|d| !d.is_empty())
                    .unwrap_or("no description");
                format!("- {id}: {description}")
            })
            .collect::<Vec<_>>()
            .join("\n");

        let system = format!(
            "{}\n\nAgents you can choose from:\n{listing}\n\n\
             Reply with exactly one agent name to act next, or STOP if the task is complete. \
             Reply with nothing else.",
            self.persona.trim()
        );

        let history = if ctx.state.is_empty() {
            "No agent has acted yet.".to_string()
        } else {
            ctx.state.transcript()
        };

        vec![
            Message::system(system),
            Message::user(format!(
                "Task:\n{}\n\nHistory:\n{history}\n\nWhich agent should act next?",
                ctx.input
            )),
        ]
    }
}

#[async_trait]
impl Router for RoutingAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn decide(&self, ctx: &RouterContext<'_>) -> Result<RouterDecision, RouterError> {
        let candidates = self.candidate_ids(ctx);
        let request = ProviderRequest::new(&self.model, self.build_messages(ctx, &candidates))
            .with_temperature(self.temperature);

        let response = self.provider.complete(request).await?;
        let decision = parse_decision(&response.message.content, &candidates)?;
        debug!(router = %self.name, call_count = ctx.call_count, ?decision, "Routing decision");
        Ok(decision)
    }
}

/// Interpret a routing reply.
///
/// Accepts a bare id, `{"next": "<id>"}`, or a stop token, all matched
/// case-insensitively. A lone identifier that is not a candidate passes
/// through unchanged for the pool to reject.
pub fn parse_decision(reply: &str, candidates: &[String]) -> Result<RouterDecision, RouterError> {
    let malformed = || RouterError::Malformed { raw: reply.to_string() };

    if let Some(next) = json_next(reply) {
        return resolve_token(&next, candidates).ok_or_else(malformed);
    }

    let cleaned = reply
        .trim()
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '`' | '.' | '!' | '*'));
    if cleaned.is_empty() {
        return Err(malformed());
    }
    if !cleaned.contains(char::is_whitespace) {
        return resolve_token(cleaned, candidates).ok_or_else(malformed);
    }

    // Prose: accept it only when it names exactly one choice.
    let mut named: Vec<RouterDecision> = Vec::new();
    for word in cleaned.split(|c: char| !is_id_char(c)).filter(|w| !w.is_empty()) {
        let choice = if is_stop(word) {
            Some(RouterDecision::Stop)
        } else {
            candidates
                .iter()
                .find(|c| c.eq_ignore_ascii_case(word))
                .map(|c| RouterDecision::Next(c.clone()))
        };
        if let Some(choice) = choice {
            if !named.contains(&choice) {
                named.push(choice);
            }
        }
    }
    match named.as_slice() {
        [only] => Ok(only.clone()),
        _ => Err(malformed()),
    }
}

fn json_next(reply: &str) -> Option<String> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end <= start {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(&reply[start..=end]).ok()?;
    value.get("next")?.as_str().map(|s| s.trim().to_string())
}

fn resolve_token(token: &str, candidates: &[String]) -> Option<RouterDecision> {
    if is_stop(token) {
        return Some(RouterDecision::Stop);
    }
    if let Some(id) = candidates.iter().find(|c| c.eq_ignore_ascii_case(token)) {
        return Some(RouterDecision::Next(id.clone()));
    }
    if !token.is_empty() && token.chars().all(is_id_char) {
        return Some(RouterDecision::Next(token.to_string()));
    }
    None
}

fn is_stop(token: &str) -> bool {
    STOP_TOKENS.iter().any(|s| s.eq_ignore_ascii_case(token))
}

fn is_id_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}
