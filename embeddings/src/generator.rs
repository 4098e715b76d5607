//! Embedding generation that always yields a usable vector.
//!
//! Generation is an ordered chain of [`Attempt`]s terminated by the
//! [`FallbackEmbedder`]. Each attempt either produces a vector or explains
//! why it could not; the first success wins and the terminal fallback cannot
//! fail, so every call returns a vector.

use std::sync::Arc;

use async_trait::async_trait;

use crate::Embedding;
use crate::error::ValidationFailure;
use crate::events::{EmbeddingEvent, SharedEventSink, default_sink};
use crate::fallback::FallbackEmbedder;
use crate::models::{FALLBACK_DIMENSIONS, FALLBACK_MODEL};
use crate::transport::EmbeddingTransport;
use crate::validator::EmbeddingValidator;

/// Character limit applied to input text before it is sent upstream.
pub const DEFAULT_MAX_INPUT_CHARS: usize = 8000;

/// Why an attempt produced nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptFailure {
    /// The request failed or came back empty.
    Transport(String),
    /// The returned vector was rejected.
    Rejected(ValidationFailure),
}

/// A vector and the model that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedEmbedding {
    /// The vector.
    pub embedding: Embedding,

    /// Model name, or [`FALLBACK_MODEL`] when the fallback produced it.
    pub model: String,
}

impl GeneratedEmbedding {
    /// Whether the fallback produced this vector.
    pub fn is_fallback(&self) -> bool {
        self.model == FALLBACK_MODEL
    }

    /// Width of the vector.
    pub fn dimensions(&self) -> usize {
        self.embedding.len()
    }
}

/// One step of the generation chain.
#[async_trait]
pub trait Attempt: Send + Sync {
    /// Try to embed `text`.
    async fn attempt(&self, text: &str) -> Result<GeneratedEmbedding, AttemptFailure>;
}

/// Calls a transport and validates what comes back.
pub struct ApiAttempt {
    transport: Arc<dyn EmbeddingTransport>,
    validator: EmbeddingValidator,
    model: String,
}

impl ApiAttempt {
    /// Create an attempt against `transport` for `model`.
    pub fn new(
        transport: Arc<dyn EmbeddingTransport>,
        validator: EmbeddingValidator,
        model: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            validator,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Attempt for ApiAttempt {
    async fn attempt(&self, text: &str) -> Result<GeneratedEmbedding, AttemptFailure> {
        let embedding = self
            .transport
            .embed(text, &self.model)
            .await
            .map_err(|e| AttemptFailure::Transport(e.to_string()))?;

        self.validator
            .validate(&embedding, &self.model)
            .map_err(AttemptFailure::Rejected)?;

        Ok(GeneratedEmbedding {
            embedding,
            model: self.model.clone(),
        })
    }
}

/// Produces embeddings, falling back to the offline embedder on any failure.
pub struct EmbeddingGenerator {
    attempts: Vec<Box<dyn Attempt>>,
    fallback: FallbackEmbedder,
    model: String,
    max_input_chars: usize,
    events: SharedEventSink,
}

impl EmbeddingGenerator {
    /// Create a generator whose only attempt is `transport` + the default
    /// validator for `model`.
    pub fn new(transport: Arc<dyn EmbeddingTransport>, model: impl Into<String>) -> Self {
        let model = model.into();
        let attempt = ApiAttempt::new(transport, EmbeddingValidator::new(), model.clone());
        Self::from_attempts(vec![Box::new(attempt)], model)
    }

    /// Create a generator from an explicit attempt chain.
    ///
    /// An empty chain is valid; every call then uses the fallback.
    pub fn from_attempts(attempts: Vec<Box<dyn Attempt>>, model: impl Into<String>) -> Self {
        Self {
            attempts,
            fallback: FallbackEmbedder::new(FALLBACK_DIMENSIONS),
            model: model.into(),
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            events: default_sink(),
        }
    }

    /// Change the fallback width.
    pub fn with_fallback_dimensions(mut self, dimensions: usize) -> Self {
        self.fallback = FallbackEmbedder::new(dimensions);
        self
    }

    /// Change the input character limit.
    pub fn with_max_input_chars(mut self, max_input_chars: usize) -> Self {
        self.max_input_chars = max_input_chars;
        self
    }

    /// Send diagnostics to `events`.
    pub fn with_events(mut self, events: SharedEventSink) -> Self {
        self.events = events;
        self
    }

    /// Configured model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generate a vector for `text`.
    pub async fn generate(&self, text: &str) -> Embedding {
        self.generate_detailed(text).await.embedding
    }

    /// Generate a vector for `text`, reporting which model produced it.
    pub async fn generate_detailed(&self, text: &str) -> GeneratedEmbedding {
        let prepared = prepare_input(text, self.max_input_chars);

        for attempt in &self.attempts {
            match attempt.attempt(&prepared).await {
                Ok(generated) => return generated,
                Err(AttemptFailure::Transport(reason)) => {
                    self.events.emit(EmbeddingEvent::TransportFailed {
                        model: self.model.clone(),
                        reason,
                    });
                }
                Err(AttemptFailure::Rejected(reason)) => {
                    self.events.emit(EmbeddingEvent::ValidationFailed {
                        model: self.model.clone(),
                        reason,
                    });
                }
            }
        }

        let embedding = self.fallback.embed(text);
        self.events.emit(EmbeddingEvent::FallbackUsed {
            dimensions: embedding.len(),
        });
        GeneratedEmbedding {
            embedding,
            model: FALLBACK_MODEL.to_string(),
        }
    }
}

/// Replace each line break (`\r\n`, `\n` or `\r`) with one space and cut
/// the text to `max_chars` characters.
pub fn prepare_input(text: &str, max_chars: usize) -> String {
    text.replace("\r\n", " ")
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .take(max_chars)
        .collect()
}
