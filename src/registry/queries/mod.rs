use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use super::models::{NamespaceRecord, NamespaceStatus};

pub struct NamespaceQueries;

impl NamespaceQueries {
    /// Inserts the record and its file list in one transaction
    #[inline]
    pub async fn insert(pool: &SqlitePool, record: &NamespaceRecord) -> Result<()> {
        let chunk_count =
            i64::try_from(record.chunk_count).context("Chunk count does not fit in SQLite")?;

        let mut tx = pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            "INSERT INTO namespaces (id, owner, chunk_count, status, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.owner)
        .bind(chunk_count)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .execute(&mut *tx)
        .await
        .context("Failed to insert namespace")?;

        for (position, path) in record.source_file_paths.iter().enumerate() {
            sqlx::query(
                "INSERT INTO namespace_files (namespace_id, position, file_path) VALUES (?, ?, ?)",
            )
            .bind(&record.id)
            .bind(position as i64)
            .bind(path)
            .execute(&mut *tx)
            .await
            .context("Failed to insert namespace file")?;
        }

        tx.commit().await.context("Failed to commit namespace")?;

        debug!("Inserted namespace {} for owner {}", record.id, record.owner);
        Ok(())
    }

    #[inline]
    pub async fn get(pool: &SqlitePool, id: &str) -> Result<Option<NamespaceRecord>> {
        let row = sqlx::query(
            "SELECT id, owner, chunk_count, status, created_at FROM namespaces WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get namespace by id")?;

        match row {
            Some(row) => Ok(Some(Self::hydrate(pool, &row).await?)),
            None => Ok(None),
        }
    }

    /// Newest first
    #[inline]
    pub async fn list_by_owner(pool: &SqlitePool, owner: &str) -> Result<Vec<NamespaceRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner, chunk_count, status, created_at
            FROM namespaces
            WHERE owner = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(owner)
        .fetch_all(pool)
        .await
        .context("Failed to list namespaces by owner")?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(Self::hydrate(pool, row).await?);
        }
        Ok(records)
    }

    #[inline]
    pub async fn list_ids(pool: &SqlitePool) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT id FROM namespaces ORDER BY id")
            .fetch_all(pool)
            .await
            .context("Failed to list namespace ids")
    }

    #[inline]
    pub async fn exists(pool: &SqlitePool, id: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM namespaces WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await
            .context("Failed to check namespace existence")?;
        Ok(count > 0)
    }

    /// Returns whether a row was removed; file rows cascade
    #[inline]
    pub async fn delete(pool: &SqlitePool, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM namespaces WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to delete namespace")?;
        Ok(result.rows_affected() > 0)
    }

    async fn hydrate(pool: &SqlitePool, row: &SqliteRow) -> Result<NamespaceRecord> {
        let id: String = row.get("id");
        let status_str: String = row.get("status");
        let status: NamespaceStatus = status_str.parse()?;
        let chunk_count: i64 = row.get("chunk_count");
        let created_at: DateTime<Utc> = row.get("created_at");

        let source_file_paths: Vec<String> = sqlx::query_scalar(
            "SELECT file_path FROM namespace_files WHERE namespace_id = ? ORDER BY position",
        )
        .bind(&id)
        .fetch_all(pool)
        .await
        .context("Failed to get namespace files")?;

        Ok(NamespaceRecord {
            id,
            owner: row.get("owner"),
            source_file_paths,
            chunk_count: u64::try_from(chunk_count).context("Negative chunk count")?,
            created_at,
            status,
        })
    }
}
