//! Embedding providers for long-term memory.
//!
//! - [`HashEmbedder`]: signed feature hashing over word tokens. No model, no
//!   network, deterministic. Texts that share words land close together.
//! - [`ProviderEmbedder`]: delegates to a model [`Provider`]'s embeddings
//!   endpoint (local Ollama or a remote API).

use async_trait::async_trait;
use ensemble_core::embedding::{EmbeddingMethod, EmbeddingProvider};
use ensemble_core::error::MemoryError;
use ensemble_core::provider::{EmbeddingRequest, Provider};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

/// Dimension used by [`HashEmbedder::default`].
pub const DEFAULT_HASH_DIMENSION: usize = 256;

/// Feature-hashing embedder.
///
/// Each lowercase alphanumeric token is hashed with SHA-256; the first eight
/// bytes pick a bucket and the ninth byte picks the sign. The result is L2
/// normalised, so text without tokens embeds to the zero vector.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Result<Self, MemoryError> {
        if dimension == 0 {
            return Err(MemoryError::InvalidArgument(
                "embedding dimension must be greater than 0".into(),
            ));
        }
        Ok(Self { dimension })
    }

    /// Embed synchronously; the trait method is a thin async wrapper.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_HASH_DIMENSION,
        }
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn name(&self) -> &str {
        "hash"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        Ok(self.embed_text(text))
    }
}

/// Embeddings from a model provider.
///
/// Every vector the provider returns is checked against the configured
/// dimension, so a model swap cannot silently corrupt a store.
pub struct ProviderEmbedder {
    provider: Arc<dyn Provider>,
    model: String,
    dimension: usize,
}

impl ProviderEmbedder {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            provider,
            model: model.into(),
            dimension,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for ProviderEmbedder {
    fn name(&self) -> &str {
        self.provider.name()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: self.model.clone(),
                inputs: vec![text.to_string()],
                dimensions: Some(self.dimension),
            })
            .await
            .map_err(|e| MemoryError::EmbeddingFailed(e.to_string()))?;

        let vector = response.embeddings.into_iter().next().ok_or_else(|| {
            MemoryError::EmbeddingFailed(format!("{} returned no embedding", self.provider.name()))
        })?;

        if vector.len() != self.dimension {
            return Err(MemoryError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        debug!(provider = %self.provider.name(), model = %self.model, "Embedded text");
        Ok(vector)
    }
}

/// Build the embedder for a configured method.
///
/// `local` and `remote` need a provider; `hash` ignores it.
pub fn build_embedder(
    method: EmbeddingMethod,
    dimension: usize,
    model: &str,
    provider: Option<Arc<dyn Provider>>,
) -> Result<Arc<dyn EmbeddingProvider>, MemoryError> {
    match method {
        EmbeddingMethod::Hash => Ok(Arc::new(HashEmbedder::new(dimension)?)),
        EmbeddingMethod::Local | EmbeddingMethod::Remote => {
            let provider = provider.ok_or_else(|| {
                MemoryError::EmbeddingFailed(format!("embedding method '{method}' needs a provider"))
            })?;
            Ok(Arc::new(ProviderEmbedder::new(provider, model, dimension)))
        }
    }
}
