// Model backends
// Embedding and text generation seams used by ingestion and answering

pub mod ollama;

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

use crate::{DocsError, Result};

pub use ollama::OllamaClient;

/// Maps text to fixed-length vectors
///
/// Implementations must be deterministic for identical input and always
/// return vectors of [`Embedder::dimension`] elements.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;

    fn dimension(&self) -> usize;

    /// Fails with [`DocsError::BackendUnavailable`] when the model cannot serve requests
    async fn health_check(&self) -> Result<()>;

    /// Embeds `texts` in order, one vector per input
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    #[inline]
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| DocsError::Other(anyhow::anyhow!("embedder returned no vector")))
    }
}

/// Free-text completion model
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn health_check(&self) -> Result<()>;

    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Rejects vectors whose length disagrees with the configured dimension
#[inline]
pub fn check_dimensions(expected: usize, vectors: &[Vec<f32>]) -> Result<()> {
    match vectors.iter().find(|vector| vector.len() != expected) {
        Some(vector) => Err(DocsError::DimensionMismatch {
            expected,
            actual: vector.len(),
        }),
        None => Ok(()),
    }
}

/// Runs one backend call under `limit`, mapping expiry to [`DocsError::Timeout`]
#[inline]
pub async fn with_timeout<T, F>(limit: Duration, operation: &str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| DocsError::Timeout {
            operation: operation.to_string(),
        })?
}
