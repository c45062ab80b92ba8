// In-process doubles for the extractor, model and index seams

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tempfile::TempDir;
use tokio::sync::Barrier;

use crate::backends::{Embedder, LanguageModel};
use crate::chunking::{Metadata, Page};
use crate::extract::{DocumentExtractor, DocumentFormat, SOURCE_KEY};
use crate::registry::Registry;
use crate::vector_index::{
    ChunkRecord, CollectionSpec, MemoryIndex, ScoredChunk, VectorIndex,
};
use crate::{DocsError, Result};

pub const DIMENSION: usize = 64;

/// Bag-of-words embedding hashed into [`DIMENSION`] buckets
pub fn hash_embedding(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; DIMENSION];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let hash = word
            .to_lowercase()
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325_u64, |acc, b| {
                (acc ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
            });
        vector[(hash % DIMENSION as u64) as usize] += 1.0;
    }
    vector
}

#[derive(Default)]
pub struct HashEmbedder {
    pub unavailable: bool,
    /// Any text containing this marker fails to embed
    pub fail_marker: Option<String>,
    /// Successful calls wait here until every party has arrived
    pub barrier: Option<Barrier>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-embedder"
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    async fn health_check(&self) -> Result<()> {
        if self.unavailable {
            Err(DocsError::BackendUnavailable(
                "embedding model offline".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let poisoned = self
            .fail_marker
            .as_deref()
            .is_some_and(|marker| texts.iter().any(|t| t.contains(marker)));
        if poisoned {
            return Err(DocsError::Other(anyhow::anyhow!("embedding server crashed")));
        }
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        Ok(texts.iter().map(|t| hash_embedding(t)).collect())
    }
}

/// Returns a fixed reply and records every prompt it receives
pub struct ScriptedModel {
    pub reply: std::result::Result<String, String>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted-model"
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt.to_string());
        self.reply
            .clone()
            .map_err(DocsError::BackendUnavailable)
    }
}

/// Serves pre-built pages per path, enforcing the real extension rules
#[derive(Default)]
pub struct StaticExtractor {
    pub documents: HashMap<PathBuf, Vec<String>>,
}

impl StaticExtractor {
    pub fn with(mut self, path: &str, pages: &[&str]) -> Self {
        self.documents.insert(
            PathBuf::from(path),
            pages.iter().map(ToString::to_string).collect(),
        );
        self
    }
}

#[async_trait]
impl DocumentExtractor for StaticExtractor {
    async fn extract(&self, path: &Path) -> Result<Vec<Page>> {
        DocumentFormat::from_path(path)?;
        let pages = self
            .documents
            .get(path)
            .ok_or_else(|| DocsError::Extraction {
                path: path.display().to_string(),
                message: "no such document".to_string(),
            })?;

        Ok(pages
            .iter()
            .map(|text| {
                let mut metadata = Metadata::new();
                metadata.insert(SOURCE_KEY.to_string(), path.display().to_string());
                Page::new(text.clone(), metadata)
            })
            .collect())
    }
}

/// Memory index that counts calls and can refuse writes, searches or deletes
pub struct InstrumentedIndex {
    pub inner: MemoryIndex,
    pub fail_writes: bool,
    pub fail_searches: bool,
    pub fail_deletes: bool,
    pub upserts: AtomicUsize,
    pub searches: AtomicUsize,
    pub deletes: AtomicUsize,
    /// Upserts already finished when the first delete arrived
    pub upserts_before_delete: Mutex<Option<usize>>,
}

impl InstrumentedIndex {
    pub fn new() -> Self {
        Self {
            inner: MemoryIndex::new(CollectionSpec::new("chunks", DIMENSION)),
            fail_writes: false,
            fail_searches: false,
            fail_deletes: false,
            upserts: AtomicUsize::new(0),
            searches: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            upserts_before_delete: Mutex::new(None),
        }
    }
}

#[async_trait]
impl VectorIndex for InstrumentedIndex {
    fn collection(&self) -> &CollectionSpec {
        self.inner.collection()
    }

    async fn ensure_collection(&self) -> Result<()> {
        self.inner.ensure_collection().await
    }

    async fn upsert(&self, namespace: &str, records: Vec<ChunkRecord>) -> Result<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes {
            return Err(DocsError::Database("index is read-only".to_string()));
        }
        self.inner.upsert(namespace, records).await
    }

    async fn search(&self, namespace: &str, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.fail_searches {
            return Err(DocsError::Database("index offline".to_string()));
        }
        self.inner.search(namespace, query, k).await
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.upserts_before_delete
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert(self.upserts.load(Ordering::SeqCst));
        if self.fail_deletes {
            return Err(DocsError::Database("index is read-only".to_string()));
        }
        self.inner.delete_namespace(namespace).await
    }

    async fn count(&self, namespace: &str) -> Result<usize> {
        self.inner.count(namespace).await
    }

    async fn namespaces(&self) -> Result<Vec<String>> {
        self.inner.namespaces().await
    }
}

pub async fn temp_registry() -> (TempDir, Registry) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let registry = Registry::open(temp_dir.path().join("metadata.db"))
        .await
        .expect("should open registry");
    (temp_dir, registry)
}

/// Paragraph of `len` characters built from repeated `word`s
pub fn paragraph(word: &str, len: usize) -> String {
    let mut text = format!("{word} ").repeat(len / (word.len() + 1) + 1);
    text.truncate(len);
    text.replace_range(len - 1.., "x");
    text
}
