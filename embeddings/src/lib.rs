//! # Embeddings
//!
//! Turns tool descriptions and search queries into vectors for the tool
//! hub's similarity index.
//!
//! ## Features
//!
//! - **Two transports**: the vendor client for the official endpoint and a
//!   direct HTTP transport for self-hosted OpenAI-compatible servers
//! - **Validation**: shape, non-zero, value range and model width checks
//! - **Fallback**: a deterministic offline embedder used whenever the API
//!   path fails, so generation never errors
//! - **Events**: typed diagnostics instead of ad-hoc log lines
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    EmbeddingGenerator                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ApiAttempt ──► EmbeddingValidator ──► vector                   │
//! │     │  (fails)                                                  │
//! │     ▼                                                           │
//! │  FallbackEmbedder ─────────────────► vector                     │
//! │                                                                 │
//! │  EmbeddingTransport: VendorTransport | DirectTransport          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod events;
pub mod fallback;
pub mod generator;
pub mod models;
pub mod similarity;
pub mod transport;
pub mod validator;

pub use error::{EmbeddingError, Result, ValidationFailure};
pub use events::{EmbeddingEvent, EventSink, SharedEventSink, TracingEventSink};
pub use fallback::FallbackEmbedder;
pub use generator::{
    ApiAttempt, Attempt, AttemptFailure, EmbeddingGenerator, GeneratedEmbedding,
    DEFAULT_MAX_INPUT_CHARS,
};
pub use models::{
    DEFAULT_DIMENSIONS, FALLBACK_DIMENSIONS, FALLBACK_MODEL, expected_dimensions,
    lookup_dimensions,
};
pub use similarity::cosine_similarity;
pub use transport::{
    DEFAULT_EMBEDDING_MODEL, DirectTransport, EmbeddingSettings, EmbeddingTransport,
    HttpTransportFactory, TransportFactory, TransportKind, VendorTransport,
};
pub use validator::EmbeddingValidator;

/// A dense vector embedding.
pub type Embedding = Vec<f32>;
