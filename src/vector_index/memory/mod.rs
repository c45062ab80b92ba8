
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

use super::{
    ChunkRecord, CollectionSpec, ScoredChunk, VectorIndex, check_query_dimension,
    check_record_dimensions, cosine_similarity, rank, validate_namespace,
};
use crate::Result;

/// In-process index with brute-force cosine search
///
/// Nothing is persisted; useful for tests and one-shot runs.
pub struct MemoryIndex {
    spec: CollectionSpec,
    namespaces: RwLock<HashMap<String, Vec<ChunkRecord>>>,
}

impl MemoryIndex {
    #[inline]
    pub fn new(spec: CollectionSpec) -> Self {
        Self {
            spec,
            namespaces: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    #[inline]
    fn collection(&self) -> &CollectionSpec {
        &self.spec
    }

    async fn ensure_collection(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, namespace: &str, records: Vec<ChunkRecord>) -> Result<()> {
        validate_namespace(namespace)?;
        check_record_dimensions(&self.spec, &records)?;

        let count = records.len();
        let mut namespaces = self
            .namespaces
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let stored = namespaces.entry(namespace.to_string()).or_default();

        for record in records {
            match stored.iter_mut().find(|r| r.position == record.position) {
                Some(existing) => *existing = record,
                None => stored.push(record),
            }
        }

        debug!("Stored {} chunks in namespace {}", count, namespace);
        Ok(())
    }

    async fn search(&self, namespace: &str, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        validate_namespace(namespace)?;
        check_query_dimension(&self.spec, query)?;

        let namespaces = self
            .namespaces
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let hits = namespaces
            .get(namespace)
            .map(|records| {
                records
                    .iter()
                    .map(|record| ScoredChunk {
                        position: record.position,
                        text: record.text.clone(),
                        metadata: record.metadata.clone(),
                        score: cosine_similarity(query, &record.vector),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(rank(hits, k))
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        validate_namespace(namespace)?;
        self.namespaces
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(namespace);
        Ok(())
    }

    async fn count(&self, namespace: &str) -> Result<usize> {
        validate_namespace(namespace)?;
        Ok(self
            .namespaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(namespace)
            .map_or(0, Vec::len))
    }

    async fn namespaces(&self) -> Result<Vec<String>> {
        let mut namespaces: Vec<String> = self
            .namespaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(namespace, _)| namespace.clone())
            .collect();
        namespaces.sort();
        Ok(namespaces)
    }
}
