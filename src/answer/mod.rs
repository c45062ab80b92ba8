// Retrieval-answering engine
// Ownership check, top-k retrieval and context-constrained completion


use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::backends::{Embedder, LanguageModel, with_timeout};
use crate::chunking::Metadata;
use crate::config::Config;
use crate::registry::Registry;
use crate::vector_index::{ScoredChunk, VectorIndex};
use crate::{DocsError, ErrorKind, Result};

/// Reply used whenever the retrieved context cannot answer the question
pub const FALLBACK_ANSWER: &str = "I cannot find this information in the provided documents.";

const ELLIPSIS: &str = "...";

/// A retrieved passage as shown to the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snippet {
    pub text: String,
    pub metadata: Metadata,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<Snippet>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Always well-formed; exactly one of `answer` and `error` is set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerResponse {
    pub answer: Option<String>,
    pub sources: Vec<Snippet>,
    pub error: Option<AnswerError>,
}

impl AnswerResponse {
    #[inline]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl From<Result<Answer>> for AnswerResponse {
    #[inline]
    fn from(result: Result<Answer>) -> Self {
        match result {
            Ok(answer) => Self {
                answer: Some(answer.answer),
                sources: answer.sources,
                error: None,
            },
            Err(e) => Self {
                answer: None,
                sources: Vec::new(),
                error: Some(AnswerError {
                    kind: e.kind(),
                    message: e.to_string(),
                }),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerOptions {
    pub default_k: usize,
    pub max_k: usize,
    /// Characters kept from each source before the ellipsis
    pub snippet_length: usize,
    pub request_timeout: Duration,
}

impl Default for AnswerOptions {
    #[inline]
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for AnswerOptions {
    #[inline]
    fn from(config: &Config) -> Self {
        Self {
            default_k: config.retrieval.default_k,
            max_k: config.retrieval.max_k,
            snippet_length: config.retrieval.snippet_length,
            request_timeout: config.ingestion.request_timeout(),
        }
    }
}

pub struct AnswerEngine {
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn LanguageModel>,
    index: Arc<dyn VectorIndex>,
    registry: Registry,
    options: AnswerOptions,
}

impl AnswerEngine {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
        index: Arc<dyn VectorIndex>,
        registry: Registry,
        options: AnswerOptions,
    ) -> Self {
        Self {
            embedder,
            model,
            index,
            registry,
            options,
        }
    }

    /// Number of chunks retrieved for a requested `k`
    #[inline]
    pub fn effective_k(&self, k: Option<usize>) -> usize {
        k.unwrap_or(self.options.default_k)
            .clamp(1, self.options.max_k.max(1))
    }

    /// Answers `question` from `namespace`, converting every failure into
    /// the error half of the response
    #[inline]
    pub async fn answer(
        &self,
        question: &str,
        namespace: &str,
        owner: &str,
        k: Option<usize>,
    ) -> AnswerResponse {
        let result = self.try_answer(question, namespace, owner, k).await;
        if let Err(e) = &result {
            warn!("Question on namespace {} failed: {}", namespace, e);
        }
        AnswerResponse::from(result)
    }

    #[inline]
    pub async fn try_answer(
        &self,
        question: &str,
        namespace: &str,
        owner: &str,
        k: Option<usize>,
    ) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(DocsError::InvalidQuery(
                "question must not be empty".to_string(),
            ));
        }

        let record = self
            .registry
            .get(namespace)
            .await?
            .ok_or_else(|| DocsError::NotFound(namespace.to_string()))?;
        if record.owner != owner {
            warn!(
                "Owner {} denied access to namespace {} owned by {}",
                owner, namespace, record.owner
            );
            return Err(DocsError::AccessDenied {
                namespace: namespace.to_string(),
            });
        }

        if record.chunk_count == 0 {
            debug!("Namespace {} holds no chunks", namespace);
            return Ok(Self::fallback());
        }

        let k = self.effective_k(k);
        let query = with_timeout(
            self.options.request_timeout,
            "question embedding",
            self.embedder.embed(question),
        )
        .await?;
        let hits = with_timeout(
            self.options.request_timeout,
            "vector search",
            self.index.search(namespace, &query, k),
        )
        .await?;

        if hits.is_empty() {
            debug!("No chunks retrieved from namespace {}", namespace);
            return Ok(Self::fallback());
        }

        debug!("Retrieved {} chunks from namespace {}", hits.len(), namespace);
        let prompt = build_prompt(question, &hits);
        let reply = with_timeout(
            self.options.request_timeout,
            "answer generation",
            self.model.complete(&prompt),
        )
        .await?;

        info!(
            "Answered question on namespace {} from {} sources",
            namespace,
            hits.len()
        );
        Ok(Answer {
            answer: reply.trim().to_string(),
            sources: hits
                .into_iter()
                .map(|hit| Snippet {
                    text: truncate_snippet(&hit.text, self.options.snippet_length),
                    metadata: hit.metadata,
                    score: hit.score,
                })
                .collect(),
        })
    }

    fn fallback() -> Answer {
        Answer {
            answer: FALLBACK_ANSWER.to_string(),
            sources: Vec::new(),
        }
    }
}

/// Prompt carrying the ranked chunk texts as the only context
#[inline]
pub fn build_prompt(question: &str, hits: &[ScoredChunk]) -> String {
    let mut context = String::new();
    for (i, hit) in hits.iter().enumerate() {
        if i > 0 {
            context.push_str("\n\n");
        }
        let _ = write!(context, "[{}] {}", i + 1, hit.text.trim());
    }

    format!(
        "Answer the question using only the context below. Do not rely on any \
         other knowledge. If the context does not contain the answer, reply \
         exactly: \"{FALLBACK_ANSWER}\"\n\n\
         Context:\n{context}\n\n\
         Question: {question}\n\n\
         Answer:"
    )
}

/// First `max_chars` characters of `text`, with an ellipsis when cut
#[inline]
pub fn truncate_snippet(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut snippet: String = text.chars().take(max_chars).collect();
    snippet.push_str(ELLIPSIS);
    snippet
}
