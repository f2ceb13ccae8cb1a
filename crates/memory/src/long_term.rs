//! Long-term memory: durable facts recalled by semantic similarity.
//!
//! Unlike the per-run turn history, long-term memory outlives a run. Facts
//! are embedded with an [`EmbeddingProvider`] and kept in a [`VectorStore`];
//! retrieval embeds the query and returns the nearest facts.

use chrono::{DateTime, Utc};
use ensemble_core::embedding::EmbeddingProvider;
use ensemble_core::error::MemoryError;
use ensemble_core::event::{DomainEvent, EventBus};
use ensemble_core::memory::{MemoryRecord, Payload, VectorStore};
use ensemble_core::state::{Turn, TurnRef};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::extract::FactExtractor;

/// Optional attributes of a stored fact.
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// The turn the fact came from
    pub source: Option<TurnRef>,
    /// Caller metadata (category, importance, ...)
    pub metadata: Payload,
}

impl StoreOptions {
    pub fn with_source(mut self, source: TurnRef) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Fact storage and similarity recall over a vector store.
pub struct LongTermMemory {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    extractor: Option<Arc<dyn FactExtractor>>,
    dedup_threshold: Option<f32>,
    event_bus: Option<Arc<EventBus>>,
    last_created_at: Mutex<Option<DateTime<Utc>>>,
    /// Serializes the dedup check with its insert.
    dedup_lock: tokio::sync::Mutex<()>,
}

impl LongTermMemory {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            store,
            embedder,
            extractor: None,
            dedup_threshold: None,
            event_bus: None,
            last_created_at: Mutex::new(None),
            dedup_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Enable auto-extraction with the given extractor.
    pub fn with_auto_extract(mut self, extractor: Arc<dyn FactExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Treat a new fact as known when an existing one scores at or above `threshold`.
    pub fn with_dedup_threshold(mut self, threshold: f32) -> Self {
        self.dedup_threshold = Some(threshold);
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn auto_extract_enabled(&self) -> bool {
        self.extractor.is_some()
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    pub fn embedder_name(&self) -> &str {
        self.embedder.name()
    }

    /// Store a fact and return its id.
    pub async fn store(&self, text: &str) -> Result<String, MemoryError> {
        self.store_with(text, StoreOptions::default()).await
    }

    /// Store a fact with provenance and metadata.
    ///
    /// With deduplication on, a text whose nearest stored fact scores at or
    /// above the threshold is not inserted; the existing id is returned.
    /// Concurrent stores through the same memory are checked one at a time.
    pub async fn store_with(&self, text: &str, options: StoreOptions) -> Result<String, MemoryError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(MemoryError::InvalidArgument("memory text must not be empty".into()));
        }

        let embedding = self.embedder.embed(text).await?;

        // Held until the insert lands so two near-identical stores cannot both miss.
        let _guard = match self.dedup_threshold {
            Some(_) => Some(self.dedup_lock.lock().await),
            None => None,
        };

        if let Some(threshold) = self.dedup_threshold {
            if let Some(hit) = self.store.query(&embedding, 1).await?.into_iter().next() {
                if hit.score >= threshold {
                    debug!(id = %hit.id, score = hit.score, "Fact already known, skipping store");
                    return Ok(hit.id);
                }
            }
        }

        let record = MemoryRecord {
            id: Uuid::new_v4().to_string(),
            text: text.to_string(),
            embedding,
            created_at: self.next_created_at(),
            source: options.source,
            metadata: options.metadata,
            score: None,
        };

        self.store
            .insert(&record.id, record.embedding.clone(), record.to_payload())
            .await?;

        debug!(id = %record.id, backend = self.store.name(), "Stored memory");
        self.publish("store", 1);
        Ok(record.id)
    }

    /// The `limit` facts most similar to `query`, most similar first.
    pub async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<MemoryRecord>, MemoryError> {
        self.search(query, limit, None).await
    }

    /// Like [`retrieve`](Self::retrieve), dropping facts scoring below `min_similarity`.
    pub async fn retrieve_above(
        &self,
        query: &str,
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        self.search(query, limit, Some(min_similarity)).await
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        min_similarity: Option<f32>,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        if limit == 0 {
            return Err(MemoryError::InvalidArgument("limit must be greater than 0".into()));
        }

        let embedding = self.embedder.embed(query).await?;
        let hits = self.store.query(&embedding, limit).await?;

        let mut records = hits
            .into_iter()
            .map(MemoryRecord::from_hit)
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(min) = min_similarity {
            records.retain(|r| r.score.unwrap_or(0.0) >= min);
        }

        records.sort_by(|a, b| {
            let (sa, sb) = (a.score.unwrap_or(0.0), b.score.unwrap_or(0.0));
            sb.partial_cmp(&sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.created_at.cmp(&a.created_at))
        });

        self.publish("retrieve", records.len());
        Ok(records)
    }

    pub async fn get(&self, id: &str) -> Result<MemoryRecord, MemoryError> {
        match self.store.get(id).await? {
            Some(record) => MemoryRecord::from_vector_record(record),
            None => Err(MemoryError::NotFound(id.to_string())),
        }
    }

    /// Delete a fact. Returns whether it existed.
    pub async fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        let deleted = self.store.delete(id).await?;
        if deleted {
            self.publish("delete", 1);
        }
        Ok(deleted)
    }

    pub async fn clear(&self) -> Result<(), MemoryError> {
        self.store.clear().await?;
        self.publish("clear", 0);
        Ok(())
    }

    pub async fn count(&self) -> Result<usize, MemoryError> {
        self.store.count().await
    }

    /// Run the configured extractor over a turn and store every fact.
    ///
    /// Returns the ids stored. Without an extractor this stores nothing.
    pub async fn extract_and_store(&self, turn: &Turn, run_id: &str) -> Result<Vec<String>, MemoryError> {
        let Some(extractor) = &self.extractor else {
            return Ok(Vec::new());
        };

        let facts = extractor.extract(turn).await?;
        let source = TurnRef {
            run_id: run_id.to_string(),
            index: turn.index,
            agent_id: turn.agent_id.clone(),
        };

        let mut ids = Vec::with_capacity(facts.len());
        for fact in facts {
            let options = StoreOptions::default()
                .with_source(source.clone())
                .with_metadata("extractor", extractor.name());
            ids.push(self.store_with(&fact, options).await?);
        }
        Ok(ids)
    }

    /// Best-effort auto-extraction for a completed turn.
    ///
    /// Failures are logged and swallowed; the run never sees them.
    pub async fn observe_turn(&self, turn: &Turn, run_id: &str) {
        if !self.auto_extract_enabled() {
            return;
        }
        match self.extract_and_store(turn, run_id).await {
            Ok(ids) => debug!(agent = %turn.agent_id, count = ids.len(), "Auto-extracted memories"),
            Err(e) => {
                warn!(agent = %turn.agent_id, error = %e, "Auto-extraction failed");
                if let Some(bus) = &self.event_bus {
                    bus.publish(DomainEvent::ErrorOccurred {
                        context: "memory.auto_extract".into(),
                        error_message: e.to_string(),
                        timestamp: Utc::now(),
                    });
                }
            }
        }
    }

    /// Render recalled facts for inclusion in a prompt.
    pub fn format_for_context(records: &[MemoryRecord]) -> String {
        if records.is_empty() {
            return String::new();
        }
        let mut out = String::from("Relevant memories:\n");
        for (i, record) in records.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", i + 1, record.text));
        }
        out
    }

    /// A creation time no earlier than any handed out before.
    fn next_created_at(&self) -> DateTime<Utc> {
        let mut last = self
            .last_created_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        let ts = match *last {
            Some(prev) if prev > now => prev,
            _ => now,
        };
        *last = Some(ts);
        ts
    }

    fn publish(&self, operation: &str, count: usize) {
        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::MemoryAccessed {
                operation: operation.into(),
                count,
                timestamp: Utc::now(),
            });
        }
    }
}
