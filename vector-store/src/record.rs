//! Records exchanged with the embedding repository.

use serde::{Deserialize, Serialize};

use toolhub_embeddings::Embedding;

/// Entity type for tool embeddings.
pub const TOOL_ENTITY_TYPE: &str = "tool";

/// An embedding to upsert. `(entity_type, entity_key)` is the natural key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEmbedding {
    /// Kind of entity, e.g. `"tool"`.
    pub entity_type: String,

    /// Natural key within the entity type, e.g. `"server:tool"`.
    pub entity_key: String,

    /// Text the vector was generated from.
    pub text_content: String,

    /// The vector.
    pub embedding: Embedding,

    /// Free-form metadata.
    pub metadata: serde_json::Value,

    /// Model that produced the vector.
    pub model: String,
}

impl NewEmbedding {
    /// Width of the vector.
    pub fn dimensions(&self) -> usize {
        self.embedding.len()
    }
}

/// A stored embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEmbedding {
    /// Kind of entity.
    pub entity_type: String,

    /// Natural key within the entity type.
    pub entity_key: String,

    /// Text the vector was generated from.
    pub text_content: String,

    /// The vector.
    pub embedding: Embedding,

    /// Free-form metadata.
    pub metadata: serde_json::Value,

    /// Model that produced the vector.
    pub model: String,

    /// Width of the vector.
    pub dimensions: usize,
}

impl From<NewEmbedding> for StoredEmbedding {
    fn from(record: NewEmbedding) -> Self {
        let dimensions = record.dimensions();
        Self {
            entity_type: record.entity_type,
            entity_key: record.entity_key,
            text_content: record.text_content,
            embedding: record.embedding,
            metadata: record.metadata,
            model: record.model,
            dimensions,
        }
    }
}

/// One hit from a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityRow {
    /// Cosine similarity to the probe.
    pub similarity: f32,

    /// The matched embedding.
    pub embedding: RowEmbedding,
}

/// Parts of a matched embedding returned with a search hit.
///
/// `metadata` is whatever the backend handed back: a JSON object, a JSON
/// document encoded as a string, or nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowEmbedding {
    /// Text the vector was generated from.
    pub text_content: String,

    /// Raw metadata.
    pub metadata: Option<serde_json::Value>,
}
