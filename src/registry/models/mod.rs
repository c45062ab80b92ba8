
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceStatus {
    Ready,
}

impl NamespaceStatus {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            NamespaceStatus::Ready => "ready",
        }
    }
}

impl std::fmt::Display for NamespaceStatus {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NamespaceStatus {
    type Err = anyhow::Error;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ready" => Ok(NamespaceStatus::Ready),
            _ => Err(anyhow::anyhow!("Invalid namespace status: {}", s)),
        }
    }
}

/// Registry entry for one successful ingestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceRecord {
    pub id: String,
    pub owner: String,
    pub source_file_paths: Vec<String>,
    pub chunk_count: u64,
    pub created_at: DateTime<Utc>,
    pub status: NamespaceStatus,
}

impl NamespaceRecord {
    #[inline]
    pub fn new(
        id: impl Into<String>,
        owner: impl Into<String>,
        source_file_paths: Vec<String>,
        chunk_count: u64,
    ) -> Self {
        Self {
            id: id.into(),
            owner: owner.into(),
            source_file_paths,
            chunk_count,
            created_at: Utc::now(),
            status: NamespaceStatus::Ready,
        }
    }

    /// Base names of the ingested files, in ingestion order
    #[inline]
    pub fn file_names(&self) -> Vec<String> {
        self.source_file_paths
            .iter()
            .map(|path| {
                Path::new(path)
                    .file_name()
                    .map_or_else(|| path.clone(), |name| name.to_string_lossy().into_owned())
            })
            .collect()
    }
}

/// Owner-facing view of a namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamespaceSummary {
    pub namespace: String,
    pub file_names: Vec<String>,
    pub chunk_count: u64,
    pub created_at: DateTime<Utc>,
    pub status: NamespaceStatus,
}

impl From<NamespaceRecord> for NamespaceSummary {
    #[inline]
    fn from(record: NamespaceRecord) -> Self {
        Self {
            file_names: record.file_names(),
            namespace: record.id,
            chunk_count: record.chunk_count,
            created_at: record.created_at,
            status: record.status,
        }
    }
}
