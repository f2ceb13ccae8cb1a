//! Wiring shared by commands: configuration and long-term memory.

use ensemble_config::{AppConfig, MemoryBackendKind};
use ensemble_core::memory::VectorStore;
use ensemble_memory::{
    build_embedder, ExchangeExtractor, FactExtractor, FileVectorStore, InMemoryVectorStore, LongTermMemory,
    ProviderExtractor, SqliteVectorStore,
};
use ensemble_providers::{embedding_provider, ProviderRouter};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    AppConfig::load().map_err(|e| format!("Failed to load config: {e}").into())
}

/// Open the long-term memory the configuration describes.
pub async fn open_memory(
    config: &AppConfig,
    providers: &ProviderRouter,
) -> Result<Arc<LongTermMemory>, Box<dyn std::error::Error>> {
    let settings = &config.memory;
    let dimension = settings.embedding_dimension;

    let store: Arc<dyn VectorStore> = match settings.backend {
        MemoryBackendKind::Memory => Arc::new(InMemoryVectorStore::with_dimension(dimension)),
        MemoryBackendKind::File => {
            let path = settings.resolved_path();
            ensure_parent_dir(&path)?;
            Arc::new(FileVectorStore::open_with_dimension(path, dimension).await?)
        }
        MemoryBackendKind::Sqlite => {
            let path = settings.resolved_path();
            ensure_parent_dir(&path)?;
            Arc::new(SqliteVectorStore::with_dimension(&path.to_string_lossy(), dimension).await?)
        }
    };

    let embedder = build_embedder(
        settings.embedding_method,
        dimension,
        &settings.embedding_model,
        embedding_provider(config, providers),
    )?;

    let mut memory = LongTermMemory::new(store, embedder);
    if let Some(threshold) = settings.dedup_threshold {
        memory = memory.with_dedup_threshold(threshold);
    }
    if settings.auto_extract {
        let extractor: Arc<dyn FactExtractor> = match providers.default() {
            Some(provider) if config.has_api_key() => {
                Arc::new(ProviderExtractor::new(provider, &config.default_model))
            }
            _ => Arc::new(ExchangeExtractor::default()),
        };
        memory = memory.with_auto_extract(extractor);
    }

    debug!(
        backend = %settings.backend,
        store = %memory.store_name(),
        embedder = %memory.embedder_name(),
        auto_extract = memory.auto_extract_enabled(),
        "Long-term memory ready"
    );
    Ok(Arc::new(memory))
}

fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}
