
use ::lancedb::query::{ExecutableQuery, QueryBase, Select};
use ::lancedb::{Connection, DistanceType, Table};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::{
    ChunkRecord, CollectionSpec, ScoredChunk, VectorIndex, check_query_dimension,
    check_record_dimensions, rank, validate_namespace,
};
use crate::chunking::Metadata;
use crate::{DocsError, Result};

/// Vector index stored in a local LanceDB directory
pub struct LanceIndex {
    connection: Connection,
    spec: CollectionSpec,
}

impl LanceIndex {
    /// Connect to (or create) the LanceDB directory at `path`
    #[inline]
    pub async fn open(path: &Path, spec: CollectionSpec) -> Result<Self> {
        std::fs::create_dir_all(path).map_err(|e| {
            DocsError::Database(format!("Failed to create vector database directory: {e}"))
        })?;

        let uri = format!("file://{}", path.display());
        debug!("Connecting to LanceDB at {}", uri);

        let connection = ::lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| DocsError::Database(format!("Failed to connect to LanceDB: {e}")))?;

        Ok(Self { connection, spec })
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("namespace", DataType::Utf8, false),
            Field::new("position", DataType::UInt32, false),
            Field::new("text", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    self.spec.dimension as i32,
                ),
                false,
            ),
        ]))
    }

    async fn table_exists(&self) -> Result<bool> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| DocsError::Database(format!("Failed to list tables: {e}")))?;
        Ok(table_names.contains(&self.spec.name))
    }

    async fn open_table(&self) -> Result<Table> {
        self.connection
            .open_table(&self.spec.name)
            .execute()
            .await
            .map_err(|e| DocsError::Database(format!("Failed to open table: {e}")))
    }

    /// Dimension of the `vector` column in the stored table
    async fn existing_dimension(&self) -> Result<usize> {
        let schema = self
            .open_table()
            .await?
            .schema()
            .await
            .map_err(|e| DocsError::Database(format!("Failed to get table schema: {e}")))?;

        schema
            .fields()
            .iter()
            .find(|field| field.name() == "vector")
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, size) => Some(*size as usize),
                _ => None,
            })
            .ok_or_else(|| {
                DocsError::Database(
                    "Could not find vector column or determine dimension".to_string(),
                )
            })
    }

    fn create_record_batch(
        &self,
        namespace: &str,
        records: &[ChunkRecord],
    ) -> Result<RecordBatch> {
        let len = records.len();
        let dimension = self.spec.dimension;

        let mut ids = Vec::with_capacity(len);
        let mut namespaces = Vec::with_capacity(len);
        let mut positions = Vec::with_capacity(len);
        let mut texts = Vec::with_capacity(len);
        let mut metadata = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * dimension);

        for record in records {
            ids.push(record.record_id(namespace));
            namespaces.push(namespace);
            positions.push(record.position);
            texts.push(record.text.as_str());
            metadata.push(serde_json::to_string(&record.metadata).map_err(|e| {
                DocsError::Database(format!("Failed to serialize chunk metadata: {e}"))
            })?);
            flat_values.extend_from_slice(&record.vector);
        }

        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            dimension as i32,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| DocsError::Database(format!("Failed to create vector array: {e}")))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(namespaces)),
            Arc::new(UInt32Array::from(positions)),
            Arc::new(StringArray::from(texts)),
            Arc::new(StringArray::from(metadata)),
            Arc::new(vector_array),
        ];

        RecordBatch::try_new(self.schema(), arrays)
            .map_err(|e| DocsError::Database(format!("Failed to create record batch: {e}")))
    }

    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<ScoredChunk>> {
        let positions = column::<UInt32Array>(batch, "position")?;
        let texts = column::<StringArray>(batch, "text")?;
        let metadata = column::<StringArray>(batch, "metadata")?;
        let distances = column::<Float32Array>(batch, "_distance")?;

        (0..batch.num_rows())
            .map(|row| {
                let metadata: Metadata = serde_json::from_str(metadata.value(row)).map_err(|e| {
                    DocsError::Database(format!("Invalid metadata column value: {e}"))
                })?;
                let distance = if distances.is_null(row) {
                    1.0
                } else {
                    distances.value(row)
                };

                Ok(ScoredChunk {
                    position: positions.value(row),
                    text: texts.value(row).to_string(),
                    metadata,
                    score: 1.0 - distance,
                })
            })
            .collect()
    }
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| DocsError::Database(format!("Missing {name} column")))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| DocsError::Database(format!("Invalid {name} column type")))
}

fn namespace_filter(namespace: &str) -> Result<String> {
    validate_namespace(namespace)?;
    Ok(format!("namespace = '{namespace}'"))
}

#[async_trait]
impl VectorIndex for LanceIndex {
    #[inline]
    fn collection(&self) -> &CollectionSpec {
        &self.spec
    }

    async fn ensure_collection(&self) -> Result<()> {
        if self.table_exists().await? {
            let existing = self.existing_dimension().await?;
            if existing != self.spec.dimension {
                return Err(DocsError::DimensionMismatch {
                    expected: existing,
                    actual: self.spec.dimension,
                });
            }
            debug!(
                "Collection {} already exists with {} dimensions",
                self.spec.name, existing
            );
            return Ok(());
        }

        self.connection
            .create_empty_table(&self.spec.name, self.schema())
            .execute()
            .await
            .map_err(|e| DocsError::Database(format!("Failed to create table: {e}")))?;

        info!(
            "Created collection {} with {} dimensions",
            self.spec.name, self.spec.dimension
        );
        Ok(())
    }

    async fn upsert(&self, namespace: &str, records: Vec<ChunkRecord>) -> Result<()> {
        validate_namespace(namespace)?;
        if records.is_empty() {
            debug!("No chunks to store");
            return Ok(());
        }
        check_record_dimensions(&self.spec, &records)?;

        let record_batch = self.create_record_batch(namespace, &records)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        self.open_table()
            .await?
            .add(reader)
            .execute()
            .await
            .map_err(|e| DocsError::Database(format!("Failed to insert chunks: {e}")))?;

        debug!("Stored {} chunks in namespace {}", records.len(), namespace);
        Ok(())
    }

    async fn search(&self, namespace: &str, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let filter = namespace_filter(namespace)?;
        check_query_dimension(&self.spec, query)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        debug!("Searching namespace {} with limit {}", namespace, k);

        // Over-fetch so equal scores at the cut can be settled by position
        let mut results = self
            .open_table()
            .await?
            .vector_search(query)
            .map_err(|e| DocsError::Database(format!("Failed to create vector search: {e}")))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .only_if(filter)
            .limit(k.saturating_mul(2))
            .execute()
            .await
            .map_err(|e| DocsError::Database(format!("Failed to execute search: {e}")))?;

        let mut hits = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| DocsError::Database(format!("Failed to read result stream: {e}")))?
        {
            hits.extend(Self::parse_search_batch(&batch)?);
        }

        Ok(rank(hits, k))
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        let filter = namespace_filter(namespace)?;
        if !self.table_exists().await? {
            return Ok(());
        }

        self.open_table()
            .await?
            .delete(&filter)
            .await
            .map_err(|e| DocsError::Database(format!("Failed to delete namespace: {e}")))?;

        info!("Deleted vectors for namespace {}", namespace);
        Ok(())
    }

    async fn count(&self, namespace: &str) -> Result<usize> {
        let filter = namespace_filter(namespace)?;
        self.open_table()
            .await?
            .count_rows(Some(filter))
            .await
            .map_err(|e| DocsError::Database(format!("Failed to count rows: {e}")))
    }

    async fn namespaces(&self) -> Result<Vec<String>> {
        let table = self.open_table().await?;
        let total = table
            .count_rows(None)
            .await
            .map_err(|e| DocsError::Database(format!("Failed to count rows: {e}")))?;
        if total == 0 {
            return Ok(Vec::new());
        }

        // Plain queries are capped at a small default limit unless told otherwise
        let mut stream = table
            .query()
            .select(Select::columns(&["namespace"]))
            .limit(total)
            .execute()
            .await
            .map_err(|e| DocsError::Database(format!("Failed to scan namespaces: {e}")))?;

        let mut namespaces = BTreeSet::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| DocsError::Database(format!("Failed to read result stream: {e}")))?
        {
            let column = column::<StringArray>(&batch, "namespace")?;
            for row in 0..batch.num_rows() {
                namespaces.insert(column.value(row).to_string());
            }
        }

        Ok(namespaces.into_iter().collect())
    }
}
