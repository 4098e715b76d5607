//! # Vector Store
//!
//! Persistence side of the tool index: one shared pgvector column holding
//! every tool embedding, kept at a single width.
//!
//! - [`IndexManager`] picks and builds the similarity index for a width
//! - [`DimensionReconciler`] migrates the column, index and stale rows when
//!   the embedding model's output width changes
//! - [`PgVectorStore`] is the Postgres backend; [`MemoryRepository`] keeps
//!   records in process
//!
//! Schema work goes through [`DataSource`] so it can run against a scripted
//! source in tests.

pub mod error;
pub mod index_manager;
pub mod memory;
pub mod postgres;
pub mod reconciler;
pub mod record;
pub mod source;

pub use error::{Result, StoreError};
pub use index_manager::{
    DEFAULT_COLUMN, DEFAULT_TABLE, HALFVEC_MAX_DIMENSIONS, IndexKind, IndexManager, IndexOutcome,
    VECTOR_MAX_DIMENSIONS, create_index,
};
pub use memory::MemoryRepository;
pub use postgres::PgVectorStore;
pub use reconciler::{
    ColumnState, CurrentWidth, DimensionReconciler, ReconcileOutcome, WidthSource,
};
pub use record::{NewEmbedding, RowEmbedding, SimilarityRow, StoredEmbedding, TOOL_ENTITY_TYPE};
pub use source::{ConnectionLifecycle, DataSource, EmbeddingRepository};
