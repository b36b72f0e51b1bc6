// LanceDB-backed embedding store
// Holds (id, vector, document) rows for one named collection and answers
// nearest-neighbor lookups for the query service

#[cfg(test)]
mod tests;

use arrow::array::{FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::{
    Connection,
    query::{ExecutableQuery, QueryBase},
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::llm::EmbeddingModel;
use crate::summarizer::ProductRecord;
use crate::{PartsBotError, Result};

/// Retrieval seam consumed by the query service; lets tests substitute a
/// fake source for the on-disk store
#[async_trait]
pub trait ContextSource: Send + Sync {
    async fn retrieve(&self, query: &str, top_n: usize) -> anyhow::Result<Vec<String>>;
}

/// Persistent vector collection with its embedding model attached
pub struct EmbeddingStore {
    connection: Connection,
    table_name: String,
    embedder: Arc<dyn EmbeddingModel>,
    vector_dimension: Option<usize>,
}

impl EmbeddingStore {
    /// Open or create the named collection under the configured data
    /// directory. Idempotent; repeated opens reference the same on-disk
    /// collection.
    #[inline]
    pub async fn open(config: &Config, embedder: Arc<dyn EmbeddingModel>) -> Result<Self> {
        let db_path = config.vector_database_path();
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(&db_path).map_err(|e| {
            PartsBotError::Store(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| PartsBotError::Store(format!("Failed to connect to LanceDB: {}", e)))?;

        let mut store = Self {
            connection,
            table_name: config.store.collection.clone(),
            embedder,
            vector_dimension: None,
        };

        if store.table_exists().await? {
            match store.detect_existing_vector_dimension().await {
                Ok(dim) => {
                    debug!("Detected existing vector dimension: {}", dim);
                    store.vector_dimension = Some(dim);
                }
                Err(e) => {
                    warn!("Could not detect vector dimension of existing table: {}", e);
                }
            }
        }

        info!("Referencing or creating collection {:?}", store.table_name);
        Ok(store)
    }

    /// Name of the collection this store operates on
    #[inline]
    pub fn collection_name(&self) -> &str {
        &self.table_name
    }

    /// Embed each record's text and append it with a synthesized id.
    ///
    /// Ids are `id_{ordinal}_{unix-seconds}`; uniqueness is best-effort and
    /// collides across runs sharing the same second and ordinal. There is no
    /// deduplication — re-running on the same input stores duplicate
    /// documents under fresh ids. Returns the number of rows added.
    #[inline]
    pub async fn populate(&mut self, records: &[ProductRecord]) -> Result<usize> {
        if records.is_empty() {
            debug!("No records to store");
            return Ok(0);
        }

        info!("Populating collection {:?}", self.table_name);

        let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
        let vectors = self
            .embedder
            .embed_batch(&texts)
            .map_err(|e| PartsBotError::Model(format!("Failed to embed records: {}", e)))?;

        if vectors.len() != texts.len() {
            return Err(PartsBotError::Model(format!(
                "Mismatch between records and embeddings: {} vs {}",
                texts.len(),
                vectors.len()
            )));
        }

        let dimension = vectors[0].len();
        if vectors.iter().any(|v| v.len() != dimension) {
            return Err(PartsBotError::Model(
                "Embedding model returned vectors of differing dimensions".to_string(),
            ));
        }

        self.ensure_table(dimension).await?;

        let batch = self.create_record_batch(&texts, &vectors, dimension)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema);

        let table = self.open_table().await?;
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| PartsBotError::Store(format!("Failed to insert records: {}", e)))?;

        info!(
            "Successfully added {} documents to collection {:?}",
            texts.len(),
            self.table_name
        );
        Ok(texts.len())
    }

    /// Embed the query and return up to `top_n` nearest documents.
    /// A missing or empty collection yields an empty result, not an error.
    #[inline]
    pub async fn search(&self, query: &str, top_n: usize) -> Result<Vec<String>> {
        if !self.table_exists().await? {
            debug!(
                "Collection {:?} does not exist, returning no results",
                self.table_name
            );
            return Ok(Vec::new());
        }

        let query_vector = self
            .embedder
            .embed(query)
            .map_err(|e| PartsBotError::Model(format!("Failed to embed query: {}", e)))?;

        let table = self.open_table().await?;
        let mut stream = table
            .vector_search(query_vector.as_slice())
            .map_err(|e| PartsBotError::Store(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .limit(top_n)
            .execute()
            .await
            .map_err(|e| PartsBotError::Store(format!("Failed to execute search: {}", e)))?;

        let mut documents = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| PartsBotError::Store(format!("Failed to read result stream: {}", e)))?
        {
            documents.extend(parse_documents(&batch)?);
        }

        debug!("Search returned {} documents", documents.len());
        Ok(documents)
    }

    /// Irreversibly remove every entry under the active collection name.
    /// There is no confirmation step at this layer; callers guard
    /// destructive use.
    #[inline]
    pub async fn delete_collection(&mut self) -> Result<()> {
        if !self.table_exists().await? {
            debug!("Collection {:?} does not exist, nothing to delete", self.table_name);
            return Ok(());
        }

        self.connection
            .drop_table(&self.table_name)
            .await
            .map_err(|e| PartsBotError::Store(format!("Failed to drop collection: {}", e)))?;

        self.vector_dimension = None;
        info!("Deleted collection {:?}", self.table_name);
        Ok(())
    }

    /// Number of entries present in the collection
    #[inline]
    pub async fn count(&self) -> Result<u64> {
        if !self.table_exists().await? {
            return Ok(0);
        }

        let table = self.open_table().await?;
        let count = table
            .count_rows(None)
            .await
            .map_err(|e| PartsBotError::Store(format!("Failed to count rows: {}", e)))?;

        Ok(count as u64)
    }

    async fn table_exists(&self) -> Result<bool> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| PartsBotError::Store(format!("Failed to list tables: {}", e)))?;
        Ok(table_names.contains(&self.table_name))
    }

    async fn open_table(&self) -> Result<lancedb::Table> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| PartsBotError::Store(format!("Failed to open table: {}", e)))
    }

    /// Create the table on first insert, or recreate it when the embedding
    /// dimension no longer matches the stored one
    async fn ensure_table(&mut self, dimension: usize) -> Result<()> {
        if self.table_exists().await? {
            if self.vector_dimension == Some(dimension) {
                return Ok(());
            }

            warn!(
                "Vector dimension changed from {:?} to {}, recreating collection",
                self.vector_dimension, dimension
            );
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| PartsBotError::Store(format!("Failed to drop table: {}", e)))?;
        }

        let schema = create_schema(dimension);
        self.connection
            .create_empty_table(&self.table_name, schema)
            .execute()
            .await
            .map_err(|e| PartsBotError::Store(format!("Failed to create table: {}", e)))?;

        self.vector_dimension = Some(dimension);
        debug!("Collection created with {} dimensions", dimension);
        Ok(())
    }

    async fn detect_existing_vector_dimension(&self) -> Result<usize> {
        let table = self.open_table().await?;
        let schema = table
            .schema()
            .await
            .map_err(|e| PartsBotError::Store(format!("Failed to get table schema: {}", e)))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return Ok(*size as usize);
                }
            }
        }

        Err(PartsBotError::Store(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    fn create_record_batch(
        &self,
        texts: &[String],
        vectors: &[Vec<f32>],
        dimension: usize,
    ) -> Result<RecordBatch> {
        let len = texts.len();
        let now = Utc::now();
        let timestamp = now.timestamp();
        let created_at = now.to_rfc3339();

        let mut ids = Vec::with_capacity(len);
        for i in 0..len {
            ids.push(format!("id_{}_{}", i, timestamp));
        }

        let mut flat_values = Vec::with_capacity(len * dimension);
        for vector in vectors {
            flat_values.extend_from_slice(vector);
        }
        let values_array = Float32Array::from(flat_values);
        let item_field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            item_field,
            dimension as i32,
            Arc::new(values_array),
            None,
        )
        .map_err(|e| PartsBotError::Store(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn arrow::array::Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(
                texts.iter().map(String::as_str).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(vec![created_at.as_str(); len])),
        ];

        RecordBatch::try_new(create_schema(dimension), arrays)
            .map_err(|e| PartsBotError::Store(format!("Failed to create record batch: {}", e)))
    }
}

#[async_trait]
impl ContextSource for EmbeddingStore {
    #[inline]
    async fn retrieve(&self, query: &str, top_n: usize) -> anyhow::Result<Vec<String>> {
        Ok(self.search(query, top_n).await?)
    }
}

fn create_schema(dimension: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                dimension as i32,
            ),
            false,
        ),
        Field::new("document", DataType::Utf8, false),
        Field::new("created_at", DataType::Utf8, false),
    ]))
}

fn parse_documents(batch: &RecordBatch) -> Result<Vec<String>> {
    use arrow::array::Array;

    let documents = batch
        .column_by_name("document")
        .ok_or_else(|| PartsBotError::Store("Missing document column".to_string()))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| PartsBotError::Store("Invalid document column type".to_string()))?;

    let mut parsed = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        if !documents.is_null(row) {
            parsed.push(documents.value(row).to_string());
        }
    }

    Ok(parsed)
}
