//! File-based vector store — persistent JSON-lines storage.
//!
//! Each line is one [`VectorRecord`] with its payload flattened, so a
//! long-term memory record reads as `{"id", "vector", "text", "created_at", ...}`.
//! The file is human-inspectable and needs no database.
//!
//! Records are loaded into memory on open. Every mutation rewrites the whole
//! file to a sibling temp file and renames it over the original while the
//! write lock is held, so readers and a crash mid-write never see a torn file.
//!
//! Lines that do not parse are skipped on load but written back verbatim on
//! every rewrite. A file whose records disagree on dimension (or with the
//! dimension asked for) refuses to open rather than shedding records.

use async_trait::async_trait;
use ensemble_core::error::MemoryError;
use ensemble_core::memory::{Payload, VectorHit, VectorRecord, VectorStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::vector::VectorIndex;

/// A file-backed vector store using JSONL (one JSON object per line).
pub struct FileVectorStore {
    path: PathBuf,
    index: Arc<RwLock<VectorIndex>>,
    /// Raw lines that failed to parse on open, preserved on rewrite
    unreadable: Vec<String>,
}

impl FileVectorStore {
    /// Open a store at the given path.
    ///
    /// If the file exists, records are loaded from it; corrupted lines are
    /// skipped with a warning. A missing file starts empty and is created on
    /// first write.
    ///
    /// Fails with `DuplicateId` or `DimensionMismatch` when the stored
    /// records are inconsistent.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, MemoryError> {
        Self::open_inner(path.into(), None).await
    }

    /// Open a store that only accepts vectors of the given dimension.
    ///
    /// Fails with `DimensionMismatch` if the file already holds vectors of
    /// another dimension.
    pub async fn open_with_dimension(path: impl Into<PathBuf>, dimension: usize) -> Result<Self, MemoryError> {
        Self::open_inner(path.into(), Some(dimension)).await
    }

    async fn open_inner(path: PathBuf, dimension: Option<usize>) -> Result<Self, MemoryError> {
        let (records, unreadable) = Self::load_from_disk(&path).await?;
        let index = VectorIndex::from_records(dimension, records).inspect_err(|e| {
            warn!(path = %path.display(), error = %e, "Refusing to open inconsistent vector file");
        })?;
        if !unreadable.is_empty() {
            warn!(
                path = %path.display(),
                lines = unreadable.len(),
                "Unreadable lines will be kept as-is on rewrite"
            );
        }
        debug!(path = %path.display(), count = index.len(), "File vector store loaded");
        Ok(Self {
            path,
            index: Arc::new(RwLock::new(index)),
            unreadable,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parsed records in file order, plus the lines that failed to parse.
    async fn load_from_disk(path: &Path) -> Result<(Vec<VectorRecord>, Vec<String>), MemoryError> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), Vec::new())),
            Err(e) => {
                return Err(MemoryError::StoreUnavailable(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        let mut records = Vec::new();
        let mut unreadable = Vec::new();
        for line in content.lines().filter(|line| !line.trim().is_empty()) {
            match serde_json::from_str::<VectorRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted vector record");
                    unreadable.push(line.to_string());
                }
            }
        }
        Ok((records, unreadable))
    }

    /// Write all records to disk as JSONL. Caller holds the write lock.
    async fn persist(&self, index: &VectorIndex) -> Result<(), MemoryError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    MemoryError::StoreUnavailable(format!("Failed to create memory directory: {e}"))
                })?;
            }
        }

        let mut content = String::new();
        for record in index.records() {
            let line = serde_json::to_string(record).map_err(|e| {
                MemoryError::StoreUnavailable(format!("Failed to serialize vector record: {e}"))
            })?;
            content.push_str(&line);
            content.push('\n');
        }
        for line in &self.unreadable {
            content.push_str(line);
            content.push('\n');
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &content).await.map_err(|e| {
            MemoryError::StoreUnavailable(format!("Failed to write memory file: {e}"))
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            MemoryError::StoreUnavailable(format!("Failed to replace memory file: {e}"))
        })?;

        Ok(())
    }
}

#[async_trait]
impl VectorStore for FileVectorStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn insert(&self, id: &str, vector: Vec<f32>, payload: Payload) -> Result<(), MemoryError> {
        let mut index = self.index.write().await;
        let mut next = index.clone();
        next.insert_parts(id, vector, payload)?;
        self.persist(&next).await?;
        *index = next;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        let mut index = self.index.write().await;
        if index.get(id).is_none() {
            return Ok(false);
        }
        let mut next = index.clone();
        next.delete(id);
        self.persist(&next).await?;
        *index = next;
        Ok(true)
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
        let mut index = self.index.write().await;
        let mut next = index.clone();
        next.clear();
        self.persist(&next).await?;
        *index = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn payload(text: &str) -> Payload {
        let mut p = Payload::new();
        p.insert("text".into(), text.into());
        p.insert("created_at".into(), "2026-01-01T00:00:00Z".into());
        p
    }

    fn temp_path() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory").join("vectors.jsonl");
        (dir, path)
    }

    #[tokio::test]
    async fn insert_persists_across_reopen() {
        let (_dir, path) = temp_path();

        let store = FileVectorStore::open(&path).await.unwrap();
        store.insert("a", vec![1.0, 0.0], payload("Rust is great")).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("Rust is great"));
        assert!(content.contains("\"vector\""));
        assert!(content.contains("\"created_at\""));

        let reopened = FileVectorStore::open(&path).await.unwrap();
        let record = reopened.get("a").await.unwrap().unwrap();
        assert_eq!(record.payload["text"], "Rust is great");
        assert_eq!(record.vector, vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn reopen_yields_identical_query_results() {
        let (_dir, path) = temp_path();

        let store = FileVectorStore::open(&path).await.unwrap();
        store.insert("a", vec![1.0, 0.0], payload("a")).await.unwrap();
        store.insert("b", vec![0.6, 0.8], payload("b")).await.unwrap();
        store.insert("c", vec![1.0, 0.0], payload("c")).await.unwrap();
        let before = store.query(&[1.0, 0.0], 3).await.unwrap();

        let reopened = FileVectorStore::open(&path).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 3);
        let after = reopened.query(&[1.0, 0.0], 3).await.unwrap();
        assert_eq!(before, after);
        assert_eq!(after[0].id, "c");
    }

    #[tokio::test]
    async fn delete_persists() {
        let (_dir, path) = temp_path();

        let store = FileVectorStore::open(&path).await.unwrap();
        store.insert("a", vec![1.0], payload("To be deleted")).await.unwrap();
        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());

        let reopened = FileVectorStore::open(&path).await.unwrap();
        assert!(reopened.get("a").await.unwrap().is_none());
        assert_eq!(reopened.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn clear_persists() {
        let (_dir, path) = temp_path();

        let store = FileVectorStore::open(&path).await.unwrap();
        store.insert("a", vec![1.0], payload("Entry 1")).await.unwrap();
        store.insert("b", vec![1.0], payload("Entry 2")).await.unwrap();
        store.clear().await.unwrap();

        let reopened = FileVectorStore::open(&path).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_insert_leaves_file_untouched() {
        let (_dir, path) = temp_path();

        let store = FileVectorStore::open(&path).await.unwrap();
        store.insert("a", vec![1.0, 0.0], payload("a")).await.unwrap();
        assert!(store.insert("a", vec![1.0, 0.0], payload("dup")).await.is_err());
        assert!(store.insert("b", vec![1.0], payload("short")).await.is_err());

        let reopened = FileVectorStore::open(&path).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn handles_missing_file_gracefully() {
        let (_dir, path) = temp_path();
        let store = FileVectorStore::open(&path).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn handles_corrupted_lines() {
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(tmp, r#"{{"id":"1","vector":[1.0,0.0],"text":"valid","created_at":"2026-01-01T00:00:00Z"}}"#).unwrap();
        writeln!(tmp, "this is not json").unwrap();
        writeln!(tmp, r#"{{"id":"2","vector":[0.0,1.0],"text":"also valid","created_at":"2026-01-01T00:00:00Z"}}"#).unwrap();

        let store = FileVectorStore::open(tmp.path()).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn rewrite_keeps_unreadable_lines() {
        let (_dir, path) = temp_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            concat!(
                r#"{"id":"1","vector":[1.0,0.0],"text":"valid","created_at":"2026-01-01T00:00:00Z"}"#,
                "\n",
                "{\"id\":\"2\",\"vector\":[0.0,\n",
            ),
        )
        .unwrap();

        let store = FileVectorStore::open(&path).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        store.insert("3", vec![0.0, 1.0], payload("new")).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains(r#"{"id":"2","vector":[0.0,"#));
        assert_eq!(FileVectorStore::open(&path).await.unwrap().count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn reopen_with_other_dimension_fails_and_keeps_records() {
        let (_dir, path) = temp_path();

        let store = FileVectorStore::open(&path).await.unwrap();
        store.insert("old1", vec![1.0, 0.0], payload("first")).await.unwrap();
        store.insert("old2", vec![0.0, 1.0], payload("second")).await.unwrap();
        drop(store);

        let err = FileVectorStore::open_with_dimension(&path, 3).await.err().unwrap();
        assert_eq!(err, MemoryError::DimensionMismatch { expected: 3, actual: 2 });

        let reopened = FileVectorStore::open_with_dimension(&path, 2).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 2);
        assert!(reopened.get("old1").await.unwrap().is_some());
    }
}
