//! Error types for tool index synchronization.

use thiserror::Error;

use toolhub_vector_store::StoreError;

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that abort a save batch.
///
/// Per-tool problems never show up here; they are reported in
/// [`SaveReport::failed`](crate::SaveReport::failed).
#[derive(Error, Debug)]
pub enum SyncError {
    /// The probe embedding did not reveal the width the model produces.
    #[error("probe embedding for model {model} is unusable: {reason}")]
    Probe { model: String, reason: String },

    /// Bringing the vector column to the probe width failed.
    #[error("failed to reconcile vector dimensions to {width}: {source}")]
    Reconcile {
        width: usize,
        #[source]
        source: StoreError,
    },

    /// The store could not be reached.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
