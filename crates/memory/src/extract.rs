//! Fact extraction from completed turns.
//!
//! Long-term memory runs an extractor over each completed turn when
//! auto-extraction is on, and stores every fact it returns.

use async_trait::async_trait;
use ensemble_core::error::MemoryError;
use ensemble_core::message::Message;
use ensemble_core::provider::{Provider, ProviderRequest};
use ensemble_core::state::Turn;
use std::sync::Arc;

/// Derives zero or more facts from a completed turn.
#[async_trait]
pub trait FactExtractor: Send + Sync {
    fn name(&self) -> &str;

    async fn extract(&self, turn: &Turn) -> Result<Vec<String>, MemoryError>;
}

/// Stores the whole exchange as one fact.
///
/// Exchanges where either side is shorter than `min_chars` are skipped.
#[derive(Debug, Clone)]
pub struct ExchangeExtractor {
    min_chars: usize,
}

impl ExchangeExtractor {
    pub fn new(min_chars: usize) -> Self {
        Self { min_chars }
    }
}

impl Default for ExchangeExtractor {
    fn default() -> Self {
        Self::new(10)
    }
}

#[async_trait]
impl FactExtractor for ExchangeExtractor {
    fn name(&self) -> &str {
        "exchange"
    }

    async fn extract(&self, turn: &Turn) -> Result<Vec<String>, MemoryError> {
        let input = turn.input.trim();
        let output = turn.output.trim();
        if input.chars().count() < self.min_chars || output.chars().count() < self.min_chars {
            return Ok(Vec::new());
        }
        Ok(vec![format!(
            "{agent} was asked: {input}\n{agent} answered: {output}",
            agent = turn.agent_id
        )])
    }
}

const EXTRACTION_PROMPT: &str = "You extract durable facts from a conversation turn: \
preferences, names, decisions, stable properties of people or projects. \
Reply with one short, self-contained fact per line and nothing else. \
If nothing is worth remembering, reply with NONE.";

/// Asks a model to list the facts worth keeping.
pub struct ProviderExtractor {
    provider: Arc<dyn Provider>,
    model: String,
}

impl ProviderExtractor {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

/// Parse a model's fact listing: one fact per line, bullets and numbering
/// stripped, `NONE` meaning no facts.
pub fn parse_fact_lines(reply: &str) -> Vec<String> {
    if reply.trim().eq_ignore_ascii_case("none") {
        return Vec::new();
    }
    reply
        .lines()
        .map(strip_bullet)
        .filter(|line| !line.is_empty() && !line.eq_ignore_ascii_case("none"))
        .map(str::to_string)
        .collect()
}

fn strip_bullet(line: &str) -> &str {
    let line = line.trim();
    let line = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .or_else(|| line.strip_prefix("• "))
        .unwrap_or(line);
    // "1. fact" / "12) fact"
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(stripped) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return stripped.trim();
        }
    }
    line.trim()
}

#[async_trait]
impl FactExtractor for ProviderExtractor {
    fn name(&self) -> &str {
        "provider"
    }

    async fn extract(&self, turn: &Turn) -> Result<Vec<String>, MemoryError> {
        let request = ProviderRequest::new(
            &self.model,
            vec![
                Message::system(EXTRACTION_PROMPT),
                Message::user(format!(
                    "Input to {agent}:\n{input}\n\nOutput from {agent}:\n{output}",
                    agent = turn.agent_id,
                    input = turn.input,
                    output = turn.output
                )),
            ],
        )
        .with_temperature(0.0);

        let response = self
            .provider
            .complete(request)
            .await
            .map_err(|e| MemoryError::ExtractionFailed(e.to_string()))?;

        Ok(parse_fact_lines(&response.message.content))
    }
}
