// Document question-answering service
// Wires extraction, backends, the vector index and the registry behind the
// ingest / answer / list / delete interface


use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::answer::{AnswerEngine, AnswerOptions, AnswerResponse};
use crate::backends::{Embedder, LanguageModel, OllamaClient, with_timeout};
use crate::config::Config;
use crate::extract::{DocumentExtractor, FileExtractor};
use crate::ingest::{IngestOptions, IngestOutcome, Ingestor};
use crate::registry::{NamespaceSummary, Registry};
use crate::vector_index::{CollectionSpec, DEFAULT_COLLECTION, LanceIndex, VectorIndex};
use crate::{DocsError, Result};

/// Reachability of one model backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendStatus {
    pub model: String,
    pub reachable: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub embedding: BackendStatus,
    pub generation: BackendStatus,
    pub dimension: usize,
    pub collection: String,
}

impl ServiceStatus {
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.embedding.reachable && self.generation.reachable
    }
}

/// Outcome of cross-checking the vector index against the registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Namespaces with stored vectors
    pub indexed_namespaces: usize,
    pub registered_namespaces: usize,
    /// Indexed but unregistered namespaces whose vectors were deleted
    pub removed: Vec<String>,
    /// Orphans whose deletion failed
    pub failed: Vec<String>,
}

impl ReconcileReport {
    #[inline]
    pub fn is_consistent(&self) -> bool {
        self.removed.is_empty() && self.failed.is_empty()
    }
}

pub struct DocumentQa {
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn LanguageModel>,
    index: Arc<dyn VectorIndex>,
    registry: Registry,
    ingestor: Ingestor,
    engine: AnswerEngine,
    options: IngestOptions,
}

impl DocumentQa {
    /// Builds the service over injected collaborators
    #[inline]
    pub fn new(
        config: &Config,
        extractor: Arc<dyn DocumentExtractor>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
        index: Arc<dyn VectorIndex>,
        registry: Registry,
    ) -> Self {
        let options = IngestOptions::from(&config.ingestion);
        let ingestor = Ingestor::new(
            extractor,
            Arc::clone(&embedder),
            Arc::clone(&index),
            registry.clone(),
            options,
        );
        let engine = AnswerEngine::new(
            Arc::clone(&embedder),
            Arc::clone(&model),
            Arc::clone(&index),
            registry.clone(),
            AnswerOptions::from(config),
        );

        Self {
            embedder,
            model,
            index,
            registry,
            ingestor,
            engine,
            options,
        }
    }

    /// Opens the on-disk stores under the config's base directory and
    /// connects to Ollama
    #[inline]
    pub async fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let client = Arc::new(
            OllamaClient::new(&config.ollama)?.with_timeout(config.ingestion.request_timeout()),
        );

        let spec = CollectionSpec::new(
            DEFAULT_COLLECTION,
            config.ollama.embedding_dimension as usize,
        );
        let index = LanceIndex::open(&config.vector_database_path(), spec).await?;
        index.ensure_collection().await?;

        let registry = Registry::open(config.database_path()).await?;
        debug!(
            "Opened stores under {}",
            config.get_base_dir().display()
        );

        Ok(Self::new(
            config,
            Arc::new(FileExtractor),
            Arc::clone(&client) as Arc<dyn Embedder>,
            client,
            Arc::new(index),
            registry,
        ))
    }

    #[inline]
    pub async fn ingest(&self, file_paths: &[PathBuf], owner: &str) -> Result<IngestOutcome> {
        self.ingestor.ingest(file_paths, owner).await
    }

    #[inline]
    pub async fn answer(
        &self,
        question: &str,
        namespace: &str,
        owner: &str,
        k: Option<usize>,
    ) -> AnswerResponse {
        self.engine.answer(question, namespace, owner, k).await
    }

    #[inline]
    pub async fn list_namespaces(&self, owner: &str) -> Result<Vec<NamespaceSummary>> {
        let records = self.registry.list_by_owner(owner).await?;
        Ok(records.into_iter().map(NamespaceSummary::from).collect())
    }

    /// Removes `namespace` for its owner
    ///
    /// The registry record goes first so the namespace stops being
    /// queryable even if vector cleanup fails afterwards.
    #[inline]
    pub async fn delete_namespace(&self, namespace: &str, owner: &str) -> Result<()> {
        let record = self
            .registry
            .get(namespace)
            .await?
            .ok_or_else(|| DocsError::NotFound(namespace.to_string()))?;
        if record.owner != owner {
            warn!(
                "Owner {} denied deletion of namespace {} owned by {}",
                owner, namespace, record.owner
            );
            return Err(DocsError::AccessDenied {
                namespace: namespace.to_string(),
            });
        }

        if !self.registry.delete(namespace).await? {
            return Err(DocsError::NotFound(namespace.to_string()));
        }
        info!("Deleted namespace {} for owner {}", namespace, owner);

        if let Err(e) = with_timeout(
            self.options.request_timeout,
            "vector deletion",
            self.index.delete_namespace(namespace),
        )
        .await
        {
            warn!(
                "Vectors for deleted namespace {} were not removed: {}",
                namespace, e
            );
        }
        Ok(())
    }

    #[inline]
    pub async fn status(&self) -> ServiceStatus {
        let (embedding, generation) = futures::join!(
            with_timeout(
                self.options.request_timeout,
                "embedding health check",
                self.embedder.health_check(),
            ),
            with_timeout(
                self.options.request_timeout,
                "generation health check",
                self.model.health_check(),
            ),
        );

        ServiceStatus {
            embedding: backend_status(self.embedder.model_name(), embedding),
            generation: backend_status(self.model.model_name(), generation),
            dimension: self.index.collection().dimension,
            collection: self.index.collection().name.clone(),
        }
    }

    /// Deletes vectors of namespaces the registry does not know about
    #[inline]
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        info!("Starting vector index reconciliation");

        let indexed = self.index.namespaces().await?;
        let registered: HashSet<String> = self.registry.list_ids().await?.into_iter().collect();
        debug!(
            "Found {} indexed and {} registered namespaces",
            indexed.len(),
            registered.len()
        );

        let mut report = ReconcileReport {
            indexed_namespaces: indexed.len(),
            registered_namespaces: registered.len(),
            ..ReconcileReport::default()
        };

        for namespace in indexed.into_iter().filter(|n| !registered.contains(n)) {
            match self.index.delete_namespace(&namespace).await {
                Ok(()) => {
                    info!("Removed orphaned vectors for namespace {}", namespace);
                    report.removed.push(namespace);
                }
                Err(e) => {
                    warn!("Failed to remove orphaned namespace {}: {}", namespace, e);
                    report.failed.push(namespace);
                }
            }
        }

        if report.is_consistent() {
            info!("Vector index is consistent with the registry");
        }
        Ok(report)
    }
}

fn backend_status(model: &str, result: Result<()>) -> BackendStatus {
    BackendStatus {
        model: model.to_string(),
        reachable: result.is_ok(),
        error: result.err().map(|e| e.to_string()),
    }
}
