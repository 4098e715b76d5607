//! Postgres + pgvector backed store.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::{PgPool, Postgres};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::index_manager::{DEFAULT_TABLE, is_identifier};
use crate::record::{NewEmbedding, RowEmbedding, SimilarityRow};
use crate::source::{ConnectionLifecycle, DataSource, EmbeddingRepository};

const MAX_CONNECTIONS: u32 = 5;

type UrlSource = Box<dyn Fn() -> String + Send + Sync>;

/// Embedding store on a Postgres table with a pgvector column.
///
/// The column starts out without a declared width; the dimension
/// reconciler declares one on the first save.
///
/// The store counts as connected only once the schema exists. A failed
/// schema setup keeps the pool and is retried by the next
/// [`ConnectionLifecycle::initialize`].
pub struct PgVectorStore {
    db_url: UrlSource,
    table: String,
    pool: OnceCell<PgPool>,
    schema: OnceCell<()>,
}

impl PgVectorStore {
    /// Store using [`DEFAULT_TABLE`]. Nothing connects until
    /// [`ConnectionLifecycle::initialize`].
    pub fn new(db_url: impl Into<String>) -> Self {
        let db_url = db_url.into();
        Self::with_url_source(move || db_url.clone())
    }

    /// Store whose database URL is looked up when it first connects.
    ///
    /// Once a pool exists the URL is not consulted again; pointing the
    /// store at another database needs a new store.
    pub fn with_url_source<F>(db_url: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        Self {
            db_url: Box::new(db_url),
            table: DEFAULT_TABLE.to_string(),
            pool: OnceCell::new(),
            schema: OnceCell::new(),
        }
    }

    /// Use a different table.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Store on an existing pool. The schema is still created by
    /// [`ConnectionLifecycle::initialize`].
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            db_url: Box::new(String::new),
            table: DEFAULT_TABLE.to_string(),
            pool: OnceCell::new_with(Some(pool)),
            schema: OnceCell::new(),
        }
    }

    fn pool(&self) -> Result<&PgPool> {
        self.pool.get().ok_or(StoreError::NotConnected)
    }

    fn table(&self) -> Result<&str> {
        if is_identifier(&self.table) {
            Ok(&self.table)
        } else {
            Err(StoreError::InvalidInput(format!(
                "invalid table name: {}",
                self.table
            )))
        }
    }

    async fn connect(&self) -> Result<PgPool> {
        let db_url = (self.db_url)();
        if db_url.trim().is_empty() {
            return Err(StoreError::InvalidInput(
                "no database URL configured".to_string(),
            ));
        }
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(db_url.trim())
            .await?;
        info!("Connected to vector database");
        Ok(pool)
    }

    async fn ensure_schema(&self, pool: &PgPool) -> Result<()> {
        let table = self.table()?;

        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(pool)
            .await?;

        let create = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id BIGSERIAL PRIMARY KEY,
                entity_type TEXT NOT NULL,
                entity_key TEXT NOT NULL,
                text_content TEXT NOT NULL,
                embedding vector,
                metadata JSONB,
                model TEXT NOT NULL,
                dimensions INTEGER NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (entity_type, entity_key)
            )"
        );
        sqlx::query(&create).execute(pool).await?;

        debug!("Ensured table {table} exists");
        Ok(())
    }
}

#[async_trait]
impl ConnectionLifecycle for PgVectorStore {
    fn is_connected(&self) -> bool {
        self.schema.initialized()
    }

    async fn initialize(&self) -> Result<()> {
        let pool = self.pool.get_or_try_init(|| self.connect()).await?;
        self.schema
            .get_or_try_init(|| self.ensure_schema(pool))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DataSource for PgVectorStore {
    async fn execute(&self, sql: &str, params: &[i64]) -> Result<u64> {
        let pool = self.pool()?;
        let query = params
            .iter()
            .fold(sqlx::query::<Postgres>(sql), |query, param| query.bind(*param));
        Ok(query.execute(pool).await?.rows_affected())
    }

    async fn fetch_optional_i64(&self, sql: &str, params: &[i64]) -> Result<Option<i64>> {
        let pool = self.pool()?;
        let query = params.iter().fold(
            sqlx::query_scalar::<Postgres, Option<i64>>(sql),
            |query, param| query.bind(*param),
        );
        Ok(query.fetch_optional(pool).await?.flatten())
    }
}

#[async_trait]
impl EmbeddingRepository for PgVectorStore {
    async fn save_embedding(&self, record: NewEmbedding) -> Result<()> {
        let pool = self.pool()?;
        let table = self.table()?;
        let dimensions = record.dimensions() as i32;

        let sql = format!(
            "INSERT INTO {table}
                (entity_type, entity_key, text_content, embedding, metadata, model, dimensions)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (entity_type, entity_key) DO UPDATE SET
                text_content = EXCLUDED.text_content,
                embedding = EXCLUDED.embedding,
                metadata = EXCLUDED.metadata,
                model = EXCLUDED.model,
                dimensions = EXCLUDED.dimensions,
                updated_at = NOW()"
        );

        sqlx::query(&sql)
            .bind(&record.entity_type)
            .bind(&record.entity_key)
            .bind(&record.text_content)
            .bind(Vector::from(record.embedding))
            .bind(Json(&record.metadata))
            .bind(&record.model)
            .bind(dimensions)
            .execute(pool)
            .await?;

        Ok(())
    }

    async fn search_similar(
        &self,
        probe: &[f32],
        limit: usize,
        threshold: f32,
        entity_types: &[&str],
    ) -> Result<Vec<SimilarityRow>> {
        let pool = self.pool()?;
        let table = self.table()?;

        // `<=>` is cosine distance; rows of another width cannot be compared.
        let sql = format!(
            "SELECT (1 - (embedding <=> $1))::float8 AS similarity, text_content, metadata
             FROM {table}
             WHERE dimensions = $2
               AND (cardinality($3::text[]) = 0 OR entity_type = ANY($3))
               AND 1 - (embedding <=> $1) >= $4
             ORDER BY embedding <=> $1
             LIMIT $5"
        );

        let entity_types: Vec<String> = entity_types.iter().map(ToString::to_string).collect();
        let rows: Vec<(Option<f64>, String, Option<Json<serde_json::Value>>)> =
            sqlx::query_as(&sql)
                .bind(Vector::from(probe.to_vec()))
                .bind(probe.len() as i32)
                .bind(entity_types)
                .bind(f64::from(threshold))
                .bind(limit as i64)
                .fetch_all(pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(similarity, text_content, metadata)| SimilarityRow {
                similarity: similarity.filter(|s| s.is_finite()).unwrap_or(0.0) as f32,
                embedding: RowEmbedding {
                    text_content,
                    metadata: metadata.map(|m| m.0),
                },
            })
            .collect())
    }

    async fn delete_by_server_name(&self, server_name: &str) -> Result<u64> {
        let pool = self.pool()?;
        let table = self.table()?;
        let sql = format!("DELETE FROM {table} WHERE metadata->>'serverName' = $1");
        let result = sqlx::query(&sql).bind(server_name).execute(pool).await?;
        Ok(result.rows_affected())
    }
}
