// Vector index
// Namespace-partitioned storage of embedded chunks with cosine top-k search


pub mod lancedb;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::chunking::Metadata;
use crate::{DocsError, Result};

pub use self::lancedb::LanceIndex;
pub use memory::MemoryIndex;

/// Table holding every namespace's chunks
pub const DEFAULT_COLLECTION: &str = "chunks";

/// Identity of the single collection an index serves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSpec {
    pub name: String,
    pub dimension: usize,
}

impl CollectionSpec {
    #[inline]
    pub fn new(name: impl Into<String>, dimension: usize) -> Self {
        Self {
            name: name.into(),
            dimension,
        }
    }
}

/// One embedded chunk as written to the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Index of the chunk in its ingestion's output order
    pub position: u32,
    pub text: String,
    pub metadata: Metadata,
    pub vector: Vec<f32>,
}

impl ChunkRecord {
    /// Row identifier, unique within the collection
    #[inline]
    pub fn record_id(&self, namespace: &str) -> String {
        format!("{namespace}-{}", self.position)
    }
}

/// Search hit; `score` is cosine similarity, higher first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub position: u32,
    pub text: String,
    pub metadata: Metadata,
    pub score: f32,
}

/// Persistent store of embedded chunks partitioned by namespace
///
/// All operations take `&self` so concurrent batch writes into one
/// namespace can share a single index handle.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn collection(&self) -> &CollectionSpec;

    /// Creates the collection if absent; an existing collection of another
    /// dimension is a [`DocsError::DimensionMismatch`]
    async fn ensure_collection(&self) -> Result<()>;

    async fn upsert(&self, namespace: &str, records: Vec<ChunkRecord>) -> Result<()>;

    /// Up to `k` chunks of `namespace` nearest to `query`, ranked by
    /// descending score with ties in insertion order
    async fn search(&self, namespace: &str, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;

    async fn delete_namespace(&self, namespace: &str) -> Result<()>;

    async fn count(&self, namespace: &str) -> Result<usize>;

    /// Every namespace that currently has at least one stored chunk
    async fn namespaces(&self) -> Result<Vec<String>>;
}

/// Namespace ids are 32 lowercase hex characters
#[inline]
pub fn validate_namespace(namespace: &str) -> Result<()> {
    let valid = namespace.len() == 32
        && namespace
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));

    if valid {
        Ok(())
    } else {
        Err(DocsError::InvalidQuery(format!(
            "'{namespace}' is not a valid namespace id"
        )))
    }
}

#[inline]
pub fn check_query_dimension(spec: &CollectionSpec, query: &[f32]) -> Result<()> {
    if query.len() == spec.dimension {
        Ok(())
    } else {
        Err(DocsError::DimensionMismatch {
            expected: spec.dimension,
            actual: query.len(),
        })
    }
}

#[inline]
pub fn check_record_dimensions(spec: &CollectionSpec, records: &[ChunkRecord]) -> Result<()> {
    match records.iter().find(|r| r.vector.len() != spec.dimension) {
        Some(record) => Err(DocsError::DimensionMismatch {
            expected: spec.dimension,
            actual: record.vector.len(),
        }),
        None => Ok(()),
    }
}

#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

/// Orders hits by score descending, then position ascending, and keeps `k`
#[inline]
pub fn rank(mut hits: Vec<ScoredChunk>, k: usize) -> Vec<ScoredChunk> {
    hits.sort_by(|a, b| match b.score.total_cmp(&a.score) {
        Ordering::Equal => a.position.cmp(&b.position),
        other => other,
    });
    hits.truncate(k);
    hits
}
