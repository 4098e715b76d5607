//! Known embedding models and the vector width each one produces.

use tracing::warn;

/// Model name recorded for vectors produced by the offline fallback.
pub const FALLBACK_MODEL: &str = "fallback";

/// Width of fallback vectors.
pub const FALLBACK_DIMENSIONS: usize = 100;

/// Width assumed for models missing from [`MODEL_DIMENSIONS`].
pub const DEFAULT_DIMENSIONS: usize = 1536;

/// Substring -> width, checked in order; the first match wins.
const MODEL_DIMENSIONS: &[(&str, usize)] = &[
    ("bge-m3", 1024),
    ("nomic-embed-text", 768),
    ("text-embedding-3-large", 3072),
    ("text-embedding-3-small", 1536),
];

/// Exact names that identify the offline fallback embedder.
const FALLBACK_NAMES: &[&str] = &[FALLBACK_MODEL, "simple-hash"];

/// Look up the width a model is expected to produce.
///
/// Matching is case-insensitive. Unknown models default to
/// [`DEFAULT_DIMENSIONS`] and log a warning.
pub fn expected_dimensions(model: &str) -> usize {
    match lookup_dimensions(model) {
        Some(dimensions) => dimensions,
        None => {
            warn!("Unknown embedding model {model}, assuming {DEFAULT_DIMENSIONS} dimensions");
            DEFAULT_DIMENSIONS
        }
    }
}

/// Like [`expected_dimensions`] but returns `None` for unknown models.
pub fn lookup_dimensions(model: &str) -> Option<usize> {
    let name = model.to_lowercase();

    if let Some((_, dimensions)) = MODEL_DIMENSIONS
        .iter()
        .find(|(needle, _)| name.contains(needle))
    {
        return Some(*dimensions);
    }

    if FALLBACK_NAMES.contains(&name.as_str()) {
        return Some(FALLBACK_DIMENSIONS);
    }

    None
}

/// Whether the model family needs `task_type` on embedding requests.
pub fn requires_task_type(model: &str) -> bool {
    model.to_lowercase().contains("nomic-embed-text")
}
