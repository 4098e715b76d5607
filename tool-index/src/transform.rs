//! Turns raw similarity rows back into tools.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use toolhub_vector_store::SimilarityRow;

/// Server name used when none can be recovered.
pub const UNKNOWN_SERVER: &str = "unknown";

/// A stored tool matched by a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorizedTool {
    /// Server exposing the tool.
    pub server_name: String,

    /// Tool name.
    pub tool_name: String,

    /// Tool description.
    pub description: String,

    /// Parameter schema, `{}` when unknown.
    pub input_schema: Value,

    /// Cosine similarity to the query.
    pub similarity: f32,

    /// Text the tool was embedded from.
    pub searchable_text: String,
}

/// Maps [`SimilarityRow`]s to [`VectorizedTool`]s.
///
/// Rows whose metadata is missing or unreadable are reconstructed from
/// their text; transforming never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultTransformer;

impl ResultTransformer {
    /// Transform one row.
    pub fn transform(&self, row: &SimilarityRow) -> VectorizedTool {
        let text = &row.embedding.text_content;

        match row.embedding.metadata.as_ref().and_then(parse_metadata) {
            Some(meta) => VectorizedTool {
                server_name: meta.server_name,
                tool_name: meta.tool_name,
                description: meta.description,
                input_schema: meta.input_schema,
                similarity: row.similarity,
                searchable_text: text.clone(),
            },
            None => {
                debug!("Recovering tool from text of a row without usable metadata");
                from_text(text, row.similarity)
            }
        }
    }

    /// Transform every row, keeping the order.
    pub fn transform_all(&self, rows: &[SimilarityRow]) -> Vec<VectorizedTool> {
        rows.iter().map(|row| self.transform(row)).collect()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolMetadata {
    server_name: String,
    tool_name: String,
    #[serde(default)]
    description: String,
    #[serde(default = "empty_schema")]
    input_schema: Value,
}

fn empty_schema() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Metadata is either a JSON object or a JSON document stored as a string.
fn parse_metadata(metadata: &Value) -> Option<ToolMetadata> {
    match metadata {
        Value::String(raw) => serde_json::from_str(raw).ok(),
        Value::Object(_) => serde_json::from_value(metadata.clone()).ok(),
        _ => None,
    }
}

fn from_text(text: &str, similarity: f32) -> VectorizedTool {
    let text = text.trim();
    let (tool_name, description) = match text.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (text, ""),
    };
    let server_name = tool_name
        .split_once('_')
        .map_or(UNKNOWN_SERVER, |(server, _)| server);

    VectorizedTool {
        server_name: server_name.to_string(),
        tool_name: tool_name.to_string(),
        description: description.to_string(),
        input_schema: empty_schema(),
        similarity,
        searchable_text: text.to_string(),
    }
}
