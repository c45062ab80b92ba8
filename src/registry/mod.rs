// Namespace registry
// SQLite mapping from namespace id to owner and ingestion metadata

use anyhow::Context;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use tracing::{debug, info};

use crate::{DocsError, Result};

#[cfg(test)]
mod tests;

pub mod models;
pub mod queries;

pub use models::{NamespaceRecord, NamespaceStatus, NamespaceSummary};
use queries::NamespaceQueries;

#[derive(Debug, Clone)]
pub struct Registry {
    pool: SqlitePool,
}

fn database_error(error: anyhow::Error) -> DocsError {
    DocsError::Database(format!("{error:#}"))
}

impl Registry {
    #[inline]
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create registry directory: {}", parent.display())
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .map_err(|e| DocsError::Database(format!("Failed to create connection pool: {e}")))?;

        let registry = Self { pool };
        registry.run_migrations().await?;
        Ok(registry)
    }

    #[inline]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running registry migrations");

        sqlx::migrate!("src/registry/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DocsError::Database(format!("Failed to run schema migration: {e}")))?;

        debug!("Registry migrations completed successfully");
        Ok(())
    }

    /// Records a new namespace; an existing id is never overwritten
    #[inline]
    pub async fn put(&self, record: &NamespaceRecord) -> Result<()> {
        if NamespaceQueries::exists(&self.pool, &record.id)
            .await
            .map_err(database_error)?
        {
            return Err(DocsError::Database(format!(
                "Namespace {} is already registered",
                record.id
            )));
        }
        NamespaceQueries::insert(&self.pool, record)
            .await
            .map_err(database_error)
    }

    #[inline]
    pub async fn get(&self, id: &str) -> Result<Option<NamespaceRecord>> {
        NamespaceQueries::get(&self.pool, id)
            .await
            .map_err(database_error)
    }

    #[inline]
    pub async fn contains(&self, id: &str) -> Result<bool> {
        NamespaceQueries::exists(&self.pool, id)
            .await
            .map_err(database_error)
    }

    #[inline]
    pub async fn list_by_owner(&self, owner: &str) -> Result<Vec<NamespaceRecord>> {
        NamespaceQueries::list_by_owner(&self.pool, owner)
            .await
            .map_err(database_error)
    }

    #[inline]
    pub async fn list_ids(&self) -> Result<Vec<String>> {
        NamespaceQueries::list_ids(&self.pool)
            .await
            .map_err(database_error)
    }

    /// Returns whether a record existed
    #[inline]
    pub async fn delete(&self, id: &str) -> Result<bool> {
        NamespaceQueries::delete(&self.pool, id)
            .await
            .map_err(database_error)
    }
}
