//! Similarity index selection.
//!
//! The index type depends on the vector width:
//!
//! | width              | index                         | fallback |
//! |--------------------|-------------------------------|----------|
//! | 1..=2000           | HNSW on `vector`              | IVFFlat  |
//! | 2001..=4000        | HNSW on a `halfvec` cast      | none     |
//! | > 4000             | unsupported                   |          |
//!
//! HNSW is preferred because it needs no training data, unlike IVFFlat.

use std::fmt;

use tracing::{debug, warn};

use toolhub_embeddings::events::{EmbeddingEvent, SharedEventSink, default_sink};

use crate::source::DataSource;

/// Widest vector an HNSW/IVFFlat index on the `vector` type supports.
pub const VECTOR_MAX_DIMENSIONS: usize = 2000;

/// Widest vector an HNSW index on a `halfvec` cast supports.
pub const HALFVEC_MAX_DIMENSIONS: usize = 4000;

/// Table holding embeddings.
pub const DEFAULT_TABLE: &str = "vector_embeddings";

/// Vector column of [`DEFAULT_TABLE`].
pub const DEFAULT_COLUMN: &str = "embedding";

/// IVFFlat list count.
const IVFFLAT_LISTS: usize = 100;

/// Kind of similarity index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// HNSW on the native vector type.
    Hnsw,
    /// HNSW on a half-precision cast.
    HnswHalfvec,
    /// IVFFlat on the native vector type.
    IvfFlat,
}

impl IndexKind {
    /// Stable name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hnsw => "hnsw",
            Self::HnswHalfvec => "hnsw-halfvec",
            Self::IvfFlat => "ivfflat",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of [`IndexManager::create_index`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexOutcome {
    /// Whether an index now exists.
    pub success: bool,

    /// Kind created, if any.
    pub kind: Option<IndexKind>,

    /// Human-readable summary.
    pub message: String,
}

impl IndexOutcome {
    fn created(kind: IndexKind, width: usize) -> Self {
        Self {
            success: true,
            kind: Some(kind),
            message: format!("Created {kind} index for {width} dimensions"),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            kind: None,
            message: message.into(),
        }
    }
}

/// Creates the similarity index for a table's vector column.
#[derive(Clone)]
pub struct IndexManager {
    table: String,
    column: String,
    events: SharedEventSink,
}

impl IndexManager {
    /// Manager for [`DEFAULT_TABLE`].[`DEFAULT_COLUMN`].
    pub fn new() -> Self {
        Self::for_column(DEFAULT_TABLE, DEFAULT_COLUMN)
    }

    /// Manager for an arbitrary table and column.
    pub fn for_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            events: default_sink(),
        }
    }

    /// Send diagnostics to `events`.
    pub fn with_events(mut self, events: SharedEventSink) -> Self {
        self.events = events;
        self
    }

    /// Table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Column name.
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Conventional index name, `idx_<table>_<column>`.
    pub fn index_name(&self) -> String {
        format!("idx_{}_{}", self.table, self.column)
    }

    /// Drop the index if present. Failures are logged and ignored.
    pub async fn drop_index(&self, source: &dyn DataSource) {
        let sql = format!("DROP INDEX IF EXISTS {}", self.index_name());
        if let Err(e) = source.execute(&sql, &[]).await {
            debug!("Ignoring failure to drop {}: {e}", self.index_name());
        }
    }

    /// Drop any existing index and create one suited to `width`.
    pub async fn create_index(&self, source: &dyn DataSource, width: usize) -> IndexOutcome {
        let outcome = self.build_index(source, width).await;

        match outcome.kind {
            Some(kind) => self.events.emit(EmbeddingEvent::IndexCreated {
                kind: kind.to_string(),
                width,
            }),
            None => self.events.emit(EmbeddingEvent::IndexCreationFailed {
                width,
                message: outcome.message.clone(),
            }),
        }

        outcome
    }

    async fn build_index(&self, source: &dyn DataSource, width: usize) -> IndexOutcome {
        if !is_identifier(&self.table) || !is_identifier(&self.column) {
            return IndexOutcome::failed(format!(
                "Invalid table or column name: {}.{}",
                self.table, self.column
            ));
        }

        if width == 0 {
            return IndexOutcome::failed("Cannot index vectors of width 0");
        }

        if width > HALFVEC_MAX_DIMENSIONS {
            return IndexOutcome::failed(format!(
                "Vector width {width} exceeds the indexable maximum: {VECTOR_MAX_DIMENSIONS} \
                 dimensions for vector, {HALFVEC_MAX_DIMENSIONS} for halfvec. \
                 Use an embedding model with at most {HALFVEC_MAX_DIMENSIONS} dimensions."
            ));
        }

        self.drop_index(source).await;

        if width <= VECTOR_MAX_DIMENSIONS {
            self.create_vector_index(source, width).await
        } else {
            self.create_halfvec_index(source, width).await
        }
    }

    async fn create_vector_index(&self, source: &dyn DataSource, width: usize) -> IndexOutcome {
        let hnsw = self.hnsw_sql();
        let hnsw_error = match source.execute(&hnsw, &[]).await {
            Ok(_) => return IndexOutcome::created(IndexKind::Hnsw, width),
            Err(e) => e,
        };

        warn!("HNSW index creation failed, trying IVFFlat: {hnsw_error}");

        let ivfflat = self.ivfflat_sql();
        match source.execute(&ivfflat, &[]).await {
            Ok(_) => IndexOutcome::created(IndexKind::IvfFlat, width),
            Err(e) => IndexOutcome::failed(format!(
                "Could not create a vector index: HNSW failed ({hnsw_error}), IVFFlat failed ({e})"
            )),
        }
    }

    async fn create_halfvec_index(&self, source: &dyn DataSource, width: usize) -> IndexOutcome {
        let sql = self.halfvec_sql(width);
        match source.execute(&sql, &[]).await {
            Ok(_) => IndexOutcome::created(IndexKind::HnswHalfvec, width),
            Err(e) => {
                let text = e.to_string();
                if is_halfvec_unavailable(&text) {
                    IndexOutcome::failed(format!(
                        "halfvec is not available in this database ({text}). Upgrade pgvector \
                         to 0.7.0 or later, or use an embedding model with at most \
                         {VECTOR_MAX_DIMENSIONS} dimensions."
                    ))
                } else {
                    IndexOutcome::failed(format!("Could not create halfvec index: {text}"))
                }
            }
        }
    }

    fn hnsw_sql(&self) -> String {
        format!(
            "CREATE INDEX {} ON {} USING hnsw ({} vector_cosine_ops)",
            self.index_name(),
            self.table,
            self.column
        )
    }

    fn ivfflat_sql(&self) -> String {
        format!(
            "CREATE INDEX {} ON {} USING ivfflat ({} vector_cosine_ops) WITH (lists = {IVFFLAT_LISTS})",
            self.index_name(),
            self.table,
            self.column
        )
    }

    fn halfvec_sql(&self, width: usize) -> String {
        format!(
            "CREATE INDEX {} ON {} USING hnsw (({}::halfvec({width})) halfvec_cosine_ops)",
            self.index_name(),
            self.table,
            self.column
        )
    }
}

impl Default for IndexManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Create the similarity index for `table.column` (defaults:
/// [`DEFAULT_TABLE`], [`DEFAULT_COLUMN`]).
pub async fn create_index(
    source: &dyn DataSource,
    width: usize,
    table: Option<&str>,
    column: Option<&str>,
) -> IndexOutcome {
    IndexManager::for_column(
        table.unwrap_or(DEFAULT_TABLE),
        column.unwrap_or(DEFAULT_COLUMN),
    )
    .create_index(source, width)
    .await
}

/// Whether an error says the half-precision type or its operator class is
/// missing.
fn is_halfvec_unavailable(error: &str) -> bool {
    let error = error.to_lowercase();
    error.contains("halfvec") && error.contains("does not exist")
}

/// Plain SQL identifier: ASCII letters, digits and underscores, not
/// starting with a digit.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
