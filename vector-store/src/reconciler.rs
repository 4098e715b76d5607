//! Keeps the shared vector column, its index and stored rows at one width.
//!
//! A reconciliation pass compares the width the column currently has with
//! the width the active model produces (discovered by a probe embedding) and
//! migrates when they differ:
//!
//! ```text
//! Uninitialized ──► declare width, create index
//! Consistent    ──► create index if missing
//! Mismatched    ──► drop index ─► purge stale rows ─► alter width ─► create index
//! ```
//!
//! Purged rows are gone for good; vectors of different widths cannot be
//! compared, so there is nothing to keep them for.
//!
//! A failed index build fails the pass. Widths above
//! [`HALFVEC_MAX_DIMENSIONS`] cannot be indexed at all; those columns are
//! left without an index and the refusal is only reported.

use tracing::{debug, info, warn};

use toolhub_embeddings::events::{EmbeddingEvent, SharedEventSink, default_sink};

use crate::error::{Result, StoreError};
use crate::index_manager::{HALFVEC_MAX_DIMENSIONS, IndexManager, IndexOutcome, is_identifier};
use crate::source::DataSource;

/// Where the current width came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidthSource {
    /// The column type declares it.
    Declared,
    /// Most common width among stored rows.
    Inferred,
    /// Nothing to go on.
    Unknown,
}

/// Width currently in effect for the vector column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentWidth {
    /// Width, 0 when unknown.
    pub width: usize,
    /// Where it came from.
    pub source: WidthSource,
}

/// State of the column relative to the required width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnState {
    /// No width declared and no rows.
    Uninitialized,
    /// Current width equals the required width.
    Consistent { width: usize },
    /// Current width differs from the required width.
    Mismatched { current: usize, required: usize },
}

impl ColumnState {
    /// Classify a current width against a required one.
    pub fn classify(current: usize, required: usize) -> Self {
        if current == 0 {
            Self::Uninitialized
        } else if current == required {
            Self::Consistent { width: current }
        } else {
            Self::Mismatched { current, required }
        }
    }
}

/// What a reconciliation pass found and did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// State found before any change.
    pub state: ColumnState,

    /// Width the column has afterwards.
    pub width: usize,

    /// Rows deleted because their width was stale.
    pub purged: u64,

    /// Index creation result, when an index was (re)built or refused.
    pub index: Option<IndexOutcome>,
}

impl ReconcileOutcome {
    /// Whether the pass changed anything.
    pub fn migrated(&self) -> bool {
        self.index.is_some() || self.purged > 0
    }
}

/// Reconciles the vector column with the width the model produces.
#[derive(Clone)]
pub struct DimensionReconciler {
    index_manager: IndexManager,
    events: SharedEventSink,
}

impl DimensionReconciler {
    /// Reconciler for the default table and column.
    pub fn new() -> Self {
        Self::with_index_manager(IndexManager::new())
    }

    /// Reconciler for the table and column of `index_manager`.
    pub fn with_index_manager(index_manager: IndexManager) -> Self {
        Self {
            index_manager,
            events: default_sink(),
        }
    }

    /// Send diagnostics to `events` (also used by the index manager).
    pub fn with_events(mut self, events: SharedEventSink) -> Self {
        self.index_manager = self.index_manager.with_events(events.clone());
        self.events = events;
        self
    }

    fn table(&self) -> &str {
        self.index_manager.table()
    }

    fn column(&self) -> &str {
        self.index_manager.column()
    }

    fn check_identifiers(&self) -> Result<()> {
        if is_identifier(self.table()) && is_identifier(self.column()) {
            Ok(())
        } else {
            Err(StoreError::InvalidInput(format!(
                "invalid table or column name: {}.{}",
                self.table(),
                self.column()
            )))
        }
    }

    /// Width declared by the column type, if any.
    pub async fn declared_width(&self, source: &dyn DataSource) -> Result<Option<usize>> {
        self.check_identifiers()?;
        let sql = format!(
            "SELECT atttypmod::bigint FROM pg_attribute \
             WHERE attrelid = '{}'::regclass AND attname = '{}' AND NOT attisdropped",
            self.table(),
            self.column()
        );
        let typmod = source.fetch_optional_i64(&sql, &[]).await?;
        Ok(typmod.filter(|w| *w > 0).map(|w| w as usize))
    }

    /// Most common width among stored rows, if any.
    pub async fn inferred_width(&self, source: &dyn DataSource) -> Result<Option<usize>> {
        self.check_identifiers()?;
        let sql = format!(
            "SELECT dimensions::bigint FROM {} GROUP BY dimensions ORDER BY COUNT(*) DESC LIMIT 1",
            self.table()
        );
        let width = source.fetch_optional_i64(&sql, &[]).await?;
        Ok(width.filter(|w| *w > 0).map(|w| w as usize))
    }

    /// Whether the conventional similarity index exists.
    pub async fn index_exists(&self, source: &dyn DataSource) -> Result<bool> {
        self.check_identifiers()?;
        let sql = format!(
            "SELECT 1::bigint FROM pg_indexes WHERE tablename = '{}' AND indexname = '{}'",
            self.table(),
            self.index_manager.index_name()
        );
        Ok(source.fetch_optional_i64(&sql, &[]).await?.is_some())
    }

    /// Width currently in effect: declared, else inferred, else 0.
    pub async fn current_width(&self, source: &dyn DataSource) -> Result<CurrentWidth> {
        if let Some(width) = self.declared_width(source).await? {
            return Ok(CurrentWidth {
                width,
                source: WidthSource::Declared,
            });
        }

        if let Some(width) = self.inferred_width(source).await? {
            debug!("No declared vector width, inferred {width} from stored rows");
            return Ok(CurrentWidth {
                width,
                source: WidthSource::Inferred,
            });
        }

        Ok(CurrentWidth {
            width: 0,
            source: WidthSource::Unknown,
        })
    }

    /// Bring the column, index and rows in line with `required` dimensions.
    ///
    /// `required` must come from a live probe embedding. Errors from schema
    /// changes and failed index builds propagate; only the refusal to index
    /// a width above [`HALFVEC_MAX_DIMENSIONS`] is left in the outcome.
    pub async fn reconcile(
        &self,
        source: &dyn DataSource,
        required: usize,
    ) -> Result<ReconcileOutcome> {
        if required == 0 {
            return Err(StoreError::InvalidInput(
                "required vector width must be positive".to_string(),
            ));
        }

        let current = self.current_width(source).await?;
        let state = ColumnState::classify(current.width, required);

        match state {
            ColumnState::Uninitialized => {
                info!("Initializing vector column with {required} dimensions");
                self.alter_width(source, required).await?;
                let index = self.build_index(source, required).await?;
                Ok(ReconcileOutcome {
                    state,
                    width: required,
                    purged: 0,
                    index: Some(index),
                })
            }
            ColumnState::Consistent { width } if current.source == WidthSource::Declared => {
                let index = if width <= HALFVEC_MAX_DIMENSIONS
                    && !self.index_exists(source).await?
                {
                    warn!("Vector index missing for {width} dimensions, rebuilding");
                    Some(self.build_index(source, width).await?)
                } else {
                    info!("Vector dimensions consistent at {width}");
                    None
                };
                Ok(ReconcileOutcome {
                    state,
                    width,
                    purged: 0,
                    index,
                })
            }
            ColumnState::Consistent { width } => {
                info!("Stored rows already have {width} dimensions, declaring column width");
                self.alter_width(source, width).await?;
                let index = self.build_index(source, width).await?;
                Ok(ReconcileOutcome {
                    state,
                    width,
                    purged: 0,
                    index: Some(index),
                })
            }
            ColumnState::Mismatched { current, required } => {
                self.events
                    .emit(EmbeddingEvent::DimensionMismatchDetected {
                        from: current,
                        to: required,
                    });
                self.migrate(source, required).await.map(|(purged, index)| {
                    ReconcileOutcome {
                        state,
                        width: required,
                        purged,
                        index: Some(index),
                    }
                })
            }
        }
    }

    async fn migrate(
        &self,
        source: &dyn DataSource,
        required: usize,
    ) -> Result<(u64, IndexOutcome)> {
        self.index_manager.drop_index(source).await;

        let sql = format!("DELETE FROM {} WHERE dimensions != $1", self.table());
        let purged = source.execute(&sql, &[required as i64]).await?;
        if purged > 0 {
            warn!("Deleted {purged} embeddings with stale dimensions");
        }
        self.events.emit(EmbeddingEvent::StaleRecordsPurged {
            count: purged,
            width: required,
        });

        self.alter_width(source, required).await?;
        let index = self.build_index(source, required).await?;
        Ok((purged, index))
    }

    async fn build_index(&self, source: &dyn DataSource, width: usize) -> Result<IndexOutcome> {
        let outcome = self.index_manager.create_index(source, width).await;
        if outcome.success || width > HALFVEC_MAX_DIMENSIONS {
            Ok(outcome)
        } else {
            Err(StoreError::Index(outcome.message))
        }
    }

    async fn alter_width(&self, source: &dyn DataSource, width: usize) -> Result<()> {
        self.check_identifiers()?;
        let sql = format!(
            "ALTER TABLE {} ALTER COLUMN {} TYPE vector({width})",
            self.table(),
            self.column()
        );
        source.execute(&sql, &[]).await?;
        info!("Vector column {}.{} now holds {width} dimensions", self.table(), self.column());
        Ok(())
    }
}

impl Default for DimensionReconciler {
    fn default() -> Self {
        Self::new()
    }
}
