//! Deterministic offline embedder.
//!
//! Used whenever the embedding API fails or returns something the validator
//! rejects. The output is a bag-of-words projection: domain vocabulary words
//! land on fixed positions and every word also adds a small weight at a
//! position derived from its characters. The result is L2-normalized.

use crate::Embedding;
use crate::models::FALLBACK_DIMENSIONS;
use crate::similarity::normalize;

/// Words with a dedicated vector position (their index in this list).
const VOCABULARY: &[&str] = &[
    "search", "find", "get", "fetch", "retrieve", "query", "map", "location", "weather", "file",
    "directory", "email", "message", "send", "create", "update", "delete", "browser", "web",
    "page", "click", "navigate", "screenshot", "automation", "database", "table", "record",
    "insert", "select", "schema", "data", "image", "photo", "video", "media", "upload",
    "download", "convert", "text", "document", "pdf", "excel", "word", "format", "parse", "api",
    "rest", "http", "request", "response", "json", "xml", "time", "date", "calendar", "schedule",
    "reminder", "notification", "user", "account", "login", "auth", "permission", "role",
];

/// Weight added for a vocabulary hit.
const VOCABULARY_WEIGHT: f32 = 1.0;

/// Weight added at the hashed position of every word.
const HASH_WEIGHT: f32 = 0.1;

/// Offline embedder with a fixed output width.
#[derive(Debug, Clone, Copy)]
pub struct FallbackEmbedder {
    dimensions: usize,
}

impl FallbackEmbedder {
    /// Create an embedder producing vectors of `dimensions` width.
    ///
    /// A width of zero is bumped to one so the output is never empty.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Width of produced vectors.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embed `text`.
    ///
    /// Returns the zero vector only when `text` has no tokens.
    pub fn embed(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0f32; self.dimensions];

        for word in text.to_lowercase().split_whitespace() {
            if let Some(position) = VOCABULARY
                .iter()
                .position(|v| *v == word)
                .filter(|p| *p < self.dimensions)
            {
                vector[position] += VOCABULARY_WEIGHT;
            }

            let position = (word_hash(word).unsigned_abs() as usize) % self.dimensions;
            vector[position] += HASH_WEIGHT;
        }

        normalize(&mut vector);
        vector
    }
}

impl Default for FallbackEmbedder {
    fn default() -> Self {
        Self::new(FALLBACK_DIMENSIONS)
    }
}

/// 32-bit rolling character hash (`h * 31 + c`).
fn word_hash(word: &str) -> i32 {
    word.chars()
        .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(c as i32))
}
