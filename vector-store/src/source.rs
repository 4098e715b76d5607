//! Seams to the persistence layer.

use async_trait::async_trait;

use crate::error::Result;
use crate::record::{NewEmbedding, SimilarityRow};

/// Raw SQL access used for schema introspection and DDL.
///
/// Parameters are positional (`$1`, `$2`, ...) and always integers; every
/// statement issued through this trait only binds widths.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Run a statement and return the number of affected rows.
    async fn execute(&self, sql: &str, params: &[i64]) -> Result<u64>;

    /// Run a query returning at most one integer.
    async fn fetch_optional_i64(&self, sql: &str, params: &[i64]) -> Result<Option<i64>>;
}

/// Typed access to stored embeddings.
#[async_trait]
pub trait EmbeddingRepository: Send + Sync {
    /// Insert or overwrite the record with the same natural key.
    async fn save_embedding(&self, record: NewEmbedding) -> Result<()>;

    /// Rows of the given entity types whose similarity to `probe` is at
    /// least `threshold`, best first.
    async fn search_similar(
        &self,
        probe: &[f32],
        limit: usize,
        threshold: f32,
        entity_types: &[&str],
    ) -> Result<Vec<SimilarityRow>>;

    /// Delete every record belonging to a server. Returns how many went.
    async fn delete_by_server_name(&self, server_name: &str) -> Result<u64>;
}

/// Connection management for the store.
#[async_trait]
pub trait ConnectionLifecycle: Send + Sync {
    /// Whether the store is ready for use.
    fn is_connected(&self) -> bool;

    /// Connect and prepare the schema. Safe to call more than once.
    async fn initialize(&self) -> Result<()>;
}
