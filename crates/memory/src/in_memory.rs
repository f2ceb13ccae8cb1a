//! In-memory vector store — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use ensemble_core::error::MemoryError;
use ensemble_core::memory::{Payload, VectorHit, VectorRecord, VectorStore};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::vector::VectorIndex;

/// A vector store that keeps records in process memory.
pub struct InMemoryVectorStore {
    index: Arc<RwLock<VectorIndex>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            index: Arc::new(RwLock::new(VectorIndex::new())),
        }
    }

    /// A store that only accepts vectors of the given dimension.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            index: Arc::new(RwLock::new(VectorIndex::with_dimension(dimension))),
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn insert(&self, id: &str, vector: Vec<f32>, payload: Payload) -> Result<(), MemoryError> {
        self.index.write().await.insert_parts(id, vector, payload)
    }

    async fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        Ok(self.index.write().await.delete(id))
    }

    async fn get(&self, id: &str) -> Result<Option<VectorRecord>, MemoryError> {
        Ok(self.index.read().await.get(id).cloned())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<VectorHit>, MemoryError> {
        self.index.read().await.query(vector, k)
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.index.read().await.len())
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        self.index.write().await.clear();
        Ok(())
    }
}
