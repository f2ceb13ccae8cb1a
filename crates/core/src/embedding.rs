//! Embedding trait — maps text to a fixed-length vector.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::MemoryError;

/// How long-term memory turns text into vectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingMethod {
    /// Feature hashing, no model required (default)
    #[default]
    Hash,
    /// A model served locally through an OpenAI-compatible endpoint
    Local,
    /// A remote embeddings API
    Remote,
}

impl std::fmt::Display for EmbeddingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EmbeddingMethod::Hash => "hash",
            EmbeddingMethod::Local => "local",
            EmbeddingMethod::Remote => "remote",
        };
        f.write_str(s)
    }
}

/// The core EmbeddingProvider trait.
///
/// Every vector produced by one provider has length [`EmbeddingProvider::dimension`].
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Length of every vector this provider returns.
    fn dimension(&self) -> usize;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_defaults_to_hash() {
        assert_eq!(EmbeddingMethod::default(), EmbeddingMethod::Hash);
    }

    #[test]
    fn method_parses_snake_case() {
        let m: EmbeddingMethod = serde_json::from_str("\"remote\"").unwrap();
        assert_eq!(m, EmbeddingMethod::Remote);
        assert_eq!(m.to_string(), "remote");
    }
}
