//! Long-term memory and vector store implementations for Ensemble.

pub mod vector;
pub mod in_memory;
pub mod file_backend;
pub mod embedding;
pub mod extract;
pub mod long_term;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use vector::{cosine_similarity, VectorIndex};
pub use in_memory::InMemoryVectorStore;
pub use file_backend::FileVectorStore;
pub use embedding::{build_embedder, HashEmbedder, ProviderEmbedder, DEFAULT_HASH_DIMENSION};
pub use extract::{ExchangeExtractor, FactExtractor, ProviderExtractor};
pub use long_term::{LongTermMemory, StoreOptions};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteVectorStore;
