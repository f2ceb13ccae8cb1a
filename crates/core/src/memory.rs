//! Vector store trait and long-term memory record types.
//!
//! A [`VectorStore`] holds `(id, vector, payload)` records and answers
//! k-nearest-neighbor queries. Long-term memory layers a fact lifecycle on
//! top of it and stores each [`MemoryRecord`] as one vector record whose
//! payload carries the text, creation time and provenance.
//!
//! Store policy, shared by every backend:
//! - similarity metric is cosine similarity;
//! - equal scores rank the most recently inserted record first;
//! - inserting an id that already exists fails with `DuplicateId`;
//! - the vector dimension is fixed by the first insert.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::error::MemoryError;
use crate::state::TurnRef;

/// Opaque payload stored alongside a vector.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// A stored vector with its payload.
///
/// The payload is flattened on the wire, so a long-term memory record
/// serializes as `{"id", "vector", "text", "created_at", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    #[serde(flatten)]
    pub payload: Payload,
}

/// One result of a similarity query.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Payload,
    /// Cosine similarity to the query vector, in [-1, 1]
    pub score: f32,
}

/// The core VectorStore trait.
///
/// Implementations: in-memory, JSONL file, SQLite.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// The backend name (e.g., "in_memory", "file", "sqlite").
    fn name(&self) -> &str;

    /// Insert a record. Rejects an existing id with `DuplicateId`.
    async fn insert(&self, id: &str, vector: Vec<f32>, payload: Payload) -> Result<(), MemoryError>;

    /// Delete a record. Returns whether it existed; deleting a missing id is not an error.
    async fn delete(&self, id: &str) -> Result<bool, MemoryError>;

    /// Fetch a record by id.
    async fn get(&self, id: &str) -> Result<Option<VectorRecord>, MemoryError>;

    /// The `k` most similar records, highest score first. `k == 0` is `InvalidArgument`.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<VectorHit>, MemoryError>;

    /// Number of live records.
    async fn count(&self) -> Result<usize, MemoryError>;

    /// Remove every record.
    async fn clear(&self) -> Result<(), MemoryError>;
}

/// A fact held in long-term memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique ID, generated on store
    pub id: String,

    /// The fact itself
    pub text: String,

    /// Embedding of `text`
    pub embedding: Vec<f32>,

    /// When this memory was stored
    pub created_at: DateTime<Utc>,

    /// The turn this fact was extracted from, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<TurnRef>,

    /// Caller-supplied metadata (category, importance, ...)
    #[serde(default, skip_serializing_if = "Payload::is_empty")]
    pub metadata: Payload,

    /// Similarity to the query (set by retrieval)
    #[serde(skip)]
    pub score: Option<f32>,
}

/// The payload half of a memory record as laid out in a vector store.
#[derive(Serialize, Deserialize)]
struct RecordPayload {
    text: String,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<TurnRef>,
    #[serde(default, skip_serializing_if = "Payload::is_empty")]
    metadata: Payload,
}

impl MemoryRecord {
    /// Build the vector-store payload for this record.
    pub fn to_payload(&self) -> Payload {
        let payload = RecordPayload {
            text: self.text.clone(),
            created_at: self.created_at,
            source: self.source.clone(),
            metadata: self.metadata.clone(),
        };
        match serde_json::to_value(payload) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => Payload::new(),
        }
    }

    /// Rebuild a record from a vector store's `(id, vector, payload)`.
    pub fn from_parts(id: String, embedding: Vec<f32>, payload: Payload) -> Result<Self, MemoryError> {
        let parsed: RecordPayload = serde_json::from_value(serde_json::Value::Object(payload))
            .map_err(|e| MemoryError::StoreUnavailable(format!("record {id} has a malformed payload: {e}")))?;
        Ok(Self {
            id,
            text: parsed.text,
            embedding,
            created_at: parsed.created_at,
            source: parsed.source,
            metadata: parsed.metadata,
            score: None,
        })
    }

    pub fn from_vector_record(record: VectorRecord) -> Result<Self, MemoryError> {
        Self::from_parts(record.id, record.vector, record.payload)
    }

    pub fn from_hit(hit: VectorHit) -> Result<Self, MemoryError> {
        let score = hit.score;
        let mut record = Self::from_parts(hit.id, hit.vector, hit.payload)?;
        record.score = Some(score);
        Ok(record)
    }
}
