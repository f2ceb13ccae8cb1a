//! Vector similarity and the in-process index shared by the in-memory and
//! file stores.
//!
//! [`VectorIndex`] enforces the store policy (cosine ranking, most recent
//! first on ties, unique ids, fixed dimension). Backends wrap it in a lock and
//! add persistence.

use ensemble_core::error::MemoryError;
use ensemble_core::memory::{Payload, VectorHit, VectorRecord};

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector is zero-length or empty.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank records (given in insertion order) against a query.
///
/// Highest score first; equal scores put the later-inserted record first.
pub fn rank<'a, I>(records: I, query: &[f32], k: usize) -> Vec<VectorHit>
where
    I: IntoIterator<Item = &'a VectorRecord>,
{
    let mut scored: Vec<(f32, usize, &VectorRecord)> = records
        .into_iter()
        .enumerate()
        .map(|(seq, r)| (cosine_similarity(&r.vector, query), seq, r))
        .collect();

    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.1.cmp(&a.1))
    });
    scored.truncate(k);

    scored
        .into_iter()
        .map(|(score, _, r)| VectorHit {
            id: r.id.clone(),
            vector: r.vector.clone(),
            payload: r.payload.clone(),
            score,
        })
        .collect()
}

/// Reject `k == 0`.
pub fn check_k(k: usize) -> Result<(), MemoryError> {
    if k == 0 {
        return Err(MemoryError::InvalidArgument("k must be greater than 0".into()));
    }
    Ok(())
}

/// Check an incoming vector against the store's dimension.
pub fn check_insert_dimension(expected: Option<usize>, vector: &[f32]) -> Result<(), MemoryError> {
    if vector.is_empty() {
        return Err(MemoryError::InvalidArgument("vector must not be empty".into()));
    }
    match expected {
        Some(expected) if expected != vector.len() => Err(MemoryError::DimensionMismatch {
            expected,
            actual: vector.len(),
        }),
        _ => Ok(()),
    }
}

/// Check a query vector against the store's dimension.
pub fn check_query_dimension(expected: Option<usize>, query: &[f32]) -> Result<(), MemoryError> {
    match expected {
        Some(expected) if expected != query.len() => Err(MemoryError::InvalidArgument(format!(
            "query has dimension {}, store holds dimension {expected}",
            query.len()
        ))),
        _ => Ok(()),
    }
}

/// Insertion-ordered records plus the dimension policy.
#[derive(Debug, Default, Clone)]
pub struct VectorIndex {
    records: Vec<VectorRecord>,
    /// Dimension given at construction; survives `clear`
    fixed_dimension: Option<usize>,
    /// Dimension learned from the first insert; reset by `clear`
    learned_dimension: Option<usize>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            fixed_dimension: Some(dimension),
            ..Self::default()
        }
    }

    /// Build an index from records already in insertion order (e.g. read from disk).
    ///
    /// Fails on the first record whose id repeats or whose dimension disagrees
    /// with `fixed_dimension` (or with the first record), so a caller never
    /// holds a partial view of durable data.
    pub fn from_records(fixed_dimension: Option<usize>, records: Vec<VectorRecord>) -> Result<Self, MemoryError> {
        let mut index = Self {
            records: Vec::with_capacity(records.len()),
            fixed_dimension,
            learned_dimension: None,
        };
        for record in records {
            index.insert(record)?;
        }
        Ok(index)
    }

    pub fn dimension(&self) -> Option<usize> {
        self.fixed_dimension.or(self.learned_dimension)
    }

    pub fn insert(&mut self, record: VectorRecord) -> Result<(), MemoryError> {
        check_insert_dimension(self.dimension(), &record.vector)?;
        if self.records.iter().any(|r| r.id == record.id) {
            return Err(MemoryError::DuplicateId(record.id));
        }
        if self.dimension().is_none() {
            self.learned_dimension = Some(record.vector.len());
        }
        self.records.push(record);
        Ok(())
    }

    pub fn insert_parts(&mut self, id: &str, vector: Vec<f32>, payload: Payload) -> Result<(), MemoryError> {
        self.insert(VectorRecord {
            id: id.to_string(),
            vector,
            payload,
        })
    }

    pub fn delete(&mut self, id: &str) -> bool {
        let len_before = self.records.len();
        self.records.retain(|r| r.id != id);
        self.records.len() < len_before
    }

    pub fn get(&self, id: &str) -> Option<&VectorRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn query(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>, MemoryError> {
        check_k(k)?;
        if self.records.is_empty() {
            return Ok(Vec::new());
        }
        check_query_dimension(self.dimension(), query)?;
        Ok(rank(&self.records, query, k))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.learned_dimension = None;
    }

    pub fn records(&self) -> &[VectorRecord] {
        &self.records
    }
}
