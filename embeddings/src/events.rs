//! Typed diagnostics emitted by the embedding and vector store pipeline.
//!
//! Components never format log lines for these conditions themselves. They
//! hand an [`EmbeddingEvent`] to an [`EventSink`]; the default sink renders
//! them through `tracing`.

use std::fmt;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::error::ValidationFailure;

/// A diagnostic event.
#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddingEvent {
    /// The transport failed or returned nothing.
    TransportFailed { model: String, reason: String },

    /// A vector from the transport was rejected.
    ValidationFailed {
        model: String,
        reason: ValidationFailure,
    },

    /// The offline fallback produced the vector.
    FallbackUsed { dimensions: usize },

    /// The declared column width disagrees with the probe width.
    DimensionMismatchDetected { from: usize, to: usize },

    /// Records with a stale width were deleted.
    StaleRecordsPurged { count: u64, width: usize },

    /// A similarity index was (re)created.
    IndexCreated { kind: String, width: usize },

    /// Index creation failed.
    IndexCreationFailed { width: usize, message: String },
}

impl fmt::Display for EmbeddingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransportFailed { model, reason } => {
                write!(f, "embedding request for {model} failed: {reason}")
            }
            Self::ValidationFailed { model, reason } => {
                write!(f, "embedding from {model} rejected: {reason}")
            }
            Self::FallbackUsed { dimensions } => {
                write!(f, "using fallback embedding ({dimensions} dimensions)")
            }
            Self::DimensionMismatchDetected { from, to } => {
                write!(f, "vector dimension mismatch: stored {from}, required {to}")
            }
            Self::StaleRecordsPurged { count, width } => {
                write!(f, "deleted {count} embeddings whose width is not {width}")
            }
            Self::IndexCreated { kind, width } => {
                write!(f, "created {kind} index for {width} dimensions")
            }
            Self::IndexCreationFailed { width, message } => {
                write!(f, "could not create index for {width} dimensions: {message}")
            }
        }
    }
}

/// Consumer of [`EmbeddingEvent`]s.
pub trait EventSink: Send + Sync {
    /// Handle one event.
    fn emit(&self, event: EmbeddingEvent);
}

/// Shared handle to a sink.
pub type SharedEventSink = Arc<dyn EventSink>;

/// Renders events as `tracing` records.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: EmbeddingEvent) {
        match &event {
            EmbeddingEvent::TransportFailed { .. }
            | EmbeddingEvent::ValidationFailed { .. }
            | EmbeddingEvent::DimensionMismatchDetected { .. } => warn!("{event}"),
            EmbeddingEvent::IndexCreationFailed { .. } => error!("{event}"),
            EmbeddingEvent::FallbackUsed { .. }
            | EmbeddingEvent::StaleRecordsPurged { .. }
            | EmbeddingEvent::IndexCreated { .. } => info!("{event}"),
        }
    }
}

/// The sink used when none is configured.
pub fn default_sink() -> SharedEventSink {
    Arc::new(TracingEventSink)
}
