// Ingestion pipeline
// Files -> pages -> chunks -> embedded batches under a fresh namespace

#[cfg(test)]
mod tests;

use futures::future::{join_all, try_join_all};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backends::{Embedder, with_timeout};
use crate::chunking::{Chunk, chunk_pages};
use crate::config::IngestionConfig;
use crate::extract::DocumentExtractor;
use crate::registry::{NamespaceRecord, Registry};
use crate::vector_index::{ChunkRecord, VectorIndex};
use crate::{DocsError, Result};

/// Result of a successful ingestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    pub namespace: String,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    /// Chunks per concurrent write
    pub write_batch_size: usize,
    /// Limit applied to each embedding and index call
    pub request_timeout: Duration,
}

impl Default for IngestOptions {
    #[inline]
    fn default() -> Self {
        Self::from(&IngestionConfig::default())
    }
}

impl From<&IngestionConfig> for IngestOptions {
    #[inline]
    fn from(config: &IngestionConfig) -> Self {
        Self {
            write_batch_size: config.write_batch_size.max(1),
            request_timeout: config.request_timeout(),
        }
    }
}

/// Fresh 128-bit random namespace id as 32 lowercase hex characters
#[inline]
pub fn generate_namespace_id() -> String {
    Uuid::new_v4().simple().to_string()
}

pub struct Ingestor {
    extractor: Arc<dyn DocumentExtractor>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    registry: Registry,
    options: IngestOptions,
}

impl Ingestor {
    #[inline]
    pub fn new(
        extractor: Arc<dyn DocumentExtractor>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        registry: Registry,
        options: IngestOptions,
    ) -> Self {
        Self {
            extractor,
            embedder,
            index,
            registry,
            options,
        }
    }

    /// Ingests `file_paths` for `owner` into a new namespace
    ///
    /// The namespace is registered only after every batch is stored. When a
    /// batch fails, vectors already written under the namespace are deleted
    /// once all batches have settled.
    #[inline]
    pub async fn ingest(&self, file_paths: &[PathBuf], owner: &str) -> Result<IngestOutcome> {
        with_timeout(
            self.options.request_timeout,
            "embedding health check",
            self.embedder.health_check(),
        )
        .await
        .map_err(|e| {
            if matches!(e, DocsError::BackendUnavailable(_)) {
                e
            } else {
                DocsError::BackendUnavailable(e.to_string())
            }
        })?;

        let page_sets = try_join_all(
            file_paths
                .iter()
                .map(|path| self.extractor.extract(path.as_path())),
        )
        .await?;
        let pages: Vec<_> = page_sets.into_iter().flatten().collect();
        let chunks = chunk_pages(&pages);

        let namespace = self.allocate_namespace().await?;
        info!(
            "Ingesting {} files ({} pages, {} chunks) into namespace {} for owner {}",
            file_paths.len(),
            pages.len(),
            chunks.len(),
            namespace,
            owner
        );

        if let Err(e) = self.write_batches(&namespace, &chunks).await {
            self.roll_back(&namespace).await;
            return Err(e);
        }

        let record = NamespaceRecord::new(
            namespace.clone(),
            owner,
            file_paths
                .iter()
                .map(|path| path.display().to_string())
                .collect(),
            chunks.len() as u64,
        );
        if let Err(e) = self.registry.put(&record).await {
            error!("Failed to register namespace {}: {}", namespace, e);
            self.roll_back(&namespace).await;
            return Err(e);
        }

        info!(
            "Namespace {} ready with {} chunks",
            namespace,
            chunks.len()
        );
        Ok(IngestOutcome {
            namespace,
            chunk_count: chunks.len(),
        })
    }

    async fn allocate_namespace(&self) -> Result<String> {
        loop {
            let candidate = generate_namespace_id();
            if !self.registry.contains(&candidate).await? {
                return Ok(candidate);
            }
            warn!("Namespace id {} already registered, drawing again", candidate);
        }
    }

    /// Dispatches every batch at once and waits for all of them
    async fn write_batches(&self, namespace: &str, chunks: &[Chunk]) -> Result<()> {
        let batch_size = self.options.write_batch_size.max(1);
        let writes = chunks
            .chunks(batch_size)
            .enumerate()
            .map(|(batch_index, batch)| {
                self.write_batch(namespace, batch_index, batch_index * batch_size, batch)
            });

        let results = join_all(writes).await;
        let total = results.len();

        match results.into_iter().find_map(Result::err) {
            Some(e) => {
                error!("Ingestion into {} failed: {}", namespace, e);
                Err(e)
            }
            None => {
                debug!("All {} batches stored for {}", total, namespace);
                Ok(())
            }
        }
    }

    async fn write_batch(
        &self,
        namespace: &str,
        batch_index: usize,
        first_position: usize,
        batch: &[Chunk],
    ) -> Result<()> {
        debug!(
            "Dispatching batch {} ({} chunks) for {}",
            batch_index,
            batch.len(),
            namespace
        );

        let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = with_timeout(
            self.options.request_timeout,
            "embedding",
            self.embedder.embed_batch(&texts),
        )
        .await
        .map_err(|e| batch_error(batch_index, e))?;

        if vectors.len() != batch.len() {
            return Err(DocsError::IngestionFailed {
                batch_index,
                message: format!(
                    "expected {} embeddings, received {}",
                    batch.len(),
                    vectors.len()
                ),
            });
        }

        let records = batch
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(offset, (chunk, vector))| {
                let position = u32::try_from(first_position + offset).map_err(|_| {
                    DocsError::IngestionFailed {
                        batch_index,
                        message: "too many chunks in one ingestion".to_string(),
                    }
                })?;
                Ok(ChunkRecord {
                    position,
                    text: chunk.text.clone(),
                    metadata: chunk.metadata.clone(),
                    vector,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        with_timeout(
            self.options.request_timeout,
            "vector index write",
            self.index.upsert(namespace, records),
        )
        .await
        .map_err(|e| batch_error(batch_index, e))?;

        debug!("Batch {} stored for {}", batch_index, namespace);
        Ok(())
    }

    async fn roll_back(&self, namespace: &str) {
        warn!("Removing partially written vectors for {}", namespace);
        if let Err(e) = self.index.delete_namespace(namespace).await {
            warn!("Failed to roll back namespace {}: {}", namespace, e);
        }
    }
}

/// Dimension mismatches stay fatal; anything else fails the batch
fn batch_error(batch_index: usize, error: DocsError) -> DocsError {
    match error {
        DocsError::DimensionMismatch { .. } => error,
        other => DocsError::IngestionFailed {
            batch_index,
            message: other.to_string(),
        },
    }
}
