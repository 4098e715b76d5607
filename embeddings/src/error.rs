//! Error types for the embeddings system.

use thiserror::Error;

/// Result type alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Errors raised by an embedding transport.
///
/// None of these reach callers of [`crate::EmbeddingGenerator`]; they are
/// reported as events and trigger the fallback path.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// API key is missing.
    #[error("embedding provider not configured")]
    ProviderNotConfigured,

    /// Server answered with a non-success status.
    #[error("API request failed with status {status}: {body}")]
    ApiStatus { status: u16, body: String },

    /// Response did not carry a usable `data[0].embedding`.
    #[error("empty embedding response")]
    EmptyResponse,

    /// Vendor client error.
    #[error("vendor client error: {0}")]
    Vendor(#[from] async_openai::error::OpenAIError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Reason a candidate vector was rejected by the validator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationFailure {
    /// Not a non-empty sequence of finite numbers.
    #[error("embedding is empty or contains non-numeric values")]
    InvalidShape,

    /// Every element is exactly zero.
    #[error("embedding contains only zeros")]
    AllZeros,

    /// An element lies outside the tolerance band.
    #[error("value {value} at index {index} is outside [-{tolerance}, {tolerance}]")]
    OutOfRange {
        index: usize,
        value: f32,
        tolerance: f32,
    },

    /// Length disagrees with the width the model is known to produce.
    #[error("dimension mismatch for model {model}: expected {expected}, got {actual}")]
    DimensionMismatch {
        model: String,
        expected: usize,
        actual: usize,
    },
}
