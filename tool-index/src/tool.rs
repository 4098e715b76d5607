//! Tool descriptors and the text they are embedded from.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool as advertised by a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// Tool name.
    pub name: String,

    /// What the tool does.
    #[serde(default)]
    pub description: String,

    /// JSON schema of the tool's parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

impl Tool {
    /// Create a tool without a schema.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: None,
        }
    }

    /// Attach a parameter schema.
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    /// Text the tool is embedded from: name, description, the schema's
    /// top-level keys other than `type`/`properties`, then the property
    /// names.
    pub fn searchable_text(&self) -> String {
        let mut parts = vec![self.name.as_str(), self.description.as_str()];

        if let Some(Value::Object(schema)) = &self.input_schema {
            parts.extend(
                schema
                    .keys()
                    .map(String::as_str)
                    .filter(|k| *k != "type" && *k != "properties"),
            );

            if let Some(Value::Object(properties)) = schema.get("properties") {
                parts.extend(properties.keys().map(String::as_str));
            }
        }

        parts
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Metadata stored next to the tool's vector.
    pub fn metadata(&self, server_name: &str) -> Value {
        serde_json::json!({
            "serverName": server_name,
            "toolName": self.name,
            "description": self.description,
            "inputSchema": self.input_schema.clone().unwrap_or_else(|| serde_json::json!({})),
        })
    }
}

/// Natural key of a tool's record.
pub fn tool_key(server_name: &str, tool_name: &str) -> String {
    format!("{server_name}:{tool_name}")
}
