use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DocsError>;

#[derive(Error, Debug)]
pub enum DocsError {
    #[error("Unsupported file format '{extension}' for {path}")]
    UnsupportedFormat { path: String, extension: String },

    #[error("Failed to extract text from {path}: {message}")]
    Extraction { path: String, message: String },

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Ingestion failed at batch {batch_index}: {message}")]
    IngestionFailed { batch_index: usize, message: String },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Namespace not found: {0}")]
    NotFound(String),

    #[error("Access denied to namespace {namespace}")]
    AccessDenied { namespace: String },

    #[error("Embedding dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Timed out during {operation}")]
    Timeout { operation: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Discriminant of [`DocsError`] that survives serialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedFormat,
    Extraction,
    BackendUnavailable,
    IngestionFailed,
    InvalidQuery,
    NotFound,
    AccessDenied,
    DimensionMismatch,
    Timeout,
    Config,
    Database,
    Io,
    Other,
}

impl DocsError {
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        match *self {
            Self::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            Self::Extraction { .. } => ErrorKind::Extraction,
            Self::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
            Self::IngestionFailed { .. } => ErrorKind::IngestionFailed,
            Self::InvalidQuery(_) => ErrorKind::InvalidQuery,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AccessDenied { .. } => ErrorKind::AccessDenied,
            Self::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Config(_) => ErrorKind::Config,
            Self::Database(_) => ErrorKind::Database,
            Self::Io(_) => ErrorKind::Io,
            Self::Other(_) => ErrorKind::Other,
        }
    }
}

impl From<config::ConfigError> for DocsError {
    #[inline]
    fn from(error: config::ConfigError) -> Self {
        Self::Config(error.to_string())
    }
}

pub mod answer;
pub mod backends;
pub mod chunking;
pub mod commands;
pub mod config;
pub mod extract;
pub mod ingest;
pub mod registry;
pub mod service;
pub mod vector_index;

#[cfg(test)]
mod test_support;
