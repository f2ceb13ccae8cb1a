//! SQLite vector store.
//!
//! One table, `vectors`:
//! - `seq` — integer primary key, the insertion sequence used for tie-breaks
//! - `id` — unique record id
//! - `vector` — little-endian f32 blob
//! - `payload` — JSON object text
//!
//! Similarity is computed in process over all rows; the table is the
//! durable copy, not an index.

use async_trait::async_trait;
use ensemble_core::error::MemoryError;
use ensemble_core::memory::{Payload, VectorHit, VectorRecord, VectorStore};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::vector::{self, check_insert_dimension, check_k, check_query_dimension};

/// A durable vector store on a single SQLite database file.
pub struct SqliteVectorStore {
    pool: SqlitePool,
    fixed_dimension: Option<usize>,
    /// Dimension of the stored vectors; the write lock also serializes inserts
    dimension: RwLock<Option<usize>>,
}

impl SqliteVectorStore {
    /// Open (or create) a store.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database.
    pub async fn new(path: &str) -> Result<Self, MemoryError> {
        Self::open(path, None).await
    }

    /// Open a store that only accepts vectors of the given dimension.
    ///
    /// Fails with `DimensionMismatch` if the database already holds vectors
    /// of another dimension.
    pub async fn with_dimension(path: &str, dimension: usize) -> Result<Self, MemoryError> {
        Self::open(path, Some(dimension)).await
    }

    async fn open(path: &str, fixed_dimension: Option<usize>) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| MemoryError::StoreUnavailable(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // Every connection to an in-memory database is a separate database
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::StoreUnavailable(format!("Failed to open SQLite: {e}")))?;

        let store = Self {
            pool,
            fixed_dimension,
            dimension: RwLock::new(None),
        };
        store.run_migrations().await?;

        let stored = store.stored_dimension().await?;
        if let (Some(expected), Some(actual)) = (fixed_dimension, stored) {
            if expected != actual {
                return Err(MemoryError::DimensionMismatch { expected, actual });
            }
        }
        *store.dimension.write().await = fixed_dimension.or(stored);

        info!("SQLite vector store initialized at {path}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vectors (
                seq      INTEGER PRIMARY KEY AUTOINCREMENT,
                id       TEXT UNIQUE NOT NULL,
                vector   BLOB NOT NULL,
                payload  TEXT NOT NULL DEFAULT '{}'
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::StoreUnavailable(format!("vectors table: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    async fn stored_dimension(&self) -> Result<Option<usize>, MemoryError> {
        let row = sqlx::query("SELECT length(vector) AS bytes FROM vectors ORDER BY seq LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MemoryError::StoreUnavailable(format!("reading stored dimension: {e}")))?;

        match row {
            Some(r) => {
                let bytes: i64 = r
                    .try_get("bytes")
                    .map_err(|e| MemoryError::StoreUnavailable(format!("bytes column: {e}")))?;
                Ok(Some(bytes as usize / 4))
            }
            None => Ok(None),
        }
    }

    /// Serialize a vector to bytes.
    fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
        vector.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
        blob.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<VectorRecord, MemoryError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| MemoryError::StoreUnavailable(format!("id column: {e}")))?;
        let blob: Vec<u8> = row
            .try_get("vector")
            .map_err(|e| MemoryError::StoreUnavailable(format!("vector column: {e}")))?;
        let payload_json: String = row
            .try_get("payload")
            .map_err(|e| MemoryError::StoreUnavailable(format!("payload column: {e}")))?;

        let payload: Payload = serde_json::from_str(&payload_json)
            .map_err(|e| MemoryError::StoreUnavailable(format!("payload of {id}: {e}")))?;

        Ok(VectorRecord {
            id,
            vector: Self::blob_to_vector(&blob),
            payload,
        })
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn insert(&self, id: &str, vector: Vec<f32>, payload: Payload) -> Result<(), MemoryError> {
        let mut dimension = self.dimension.write().await;
        check_insert_dimension(*dimension, &vector)?;

        let payload_json = serde_json::to_string(&payload)
            .map_err(|e| MemoryError::StoreUnavailable(format!("Payload serialization: {e}")))?;

        let result = sqlx::query("INSERT INTO vectors (id, vector, payload) VALUES (?1, ?2, ?3)")
            .bind(id)
            .bind(Self::vector_to_blob(&vector))
            .bind(&payload_json)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => {
                if dimension.is_none() {
                    *dimension = Some(vector.len());
                }
                debug!(id, "Stored vector");
                Ok(())
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(MemoryError::DuplicateId(id.to_string()))
            }
            Err(e) => Err(MemoryError::StoreUnavailable(format!("INSERT failed: {e}"))),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        let result = sqlx::query("DELETE FROM vectors WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::StoreUnavailable(format!("DELETE failed: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, id: &str) -> Result<Option<VectorRecord>, MemoryError> {
        let row = sqlx::query("SELECT id, vector, payload FROM vectors WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MemoryError::StoreUnavailable(format!("GET by ID: {e}")))?;

        match row {
            Some(ref r) => Ok(Some(Self::row_to_record(r)?)),
            None => Ok(None),
        }
    }

    async fn query(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>, MemoryError> {
        check_k(k)?;
        let dimension = self.dimension.read().await;

        let rows = sqlx::query("SELECT id, vector, payload FROM vectors ORDER BY seq")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoryError::StoreUnavailable(format!("SCAN failed: {e}")))?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }
        check_query_dimension(*dimension, query)?;

        let records = rows
            .iter()
            .map(Self::row_to_record)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(vector::rank(&records, query, k))
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM vectors")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MemoryError::StoreUnavailable(format!("COUNT: {e}")))?;

        let cnt: i64 = row
            .try_get("cnt")
            .map_err(|e| MemoryError::StoreUnavailable(format!("cnt column: {e}")))?;

        Ok(cnt as usize)
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        let mut dimension = self.dimension.write().await;
        sqlx::query("DELETE FROM vectors")
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::StoreUnavailable(format!("CLEAR failed: {e}")))?;
        *dimension = self.fixed_dimension;
        Ok(())
    }
}
