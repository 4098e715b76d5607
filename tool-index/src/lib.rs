//! # Tool Index
//!
//! Embeds the tools connected servers advertise and finds the ones most
//! relevant to a natural-language query.
//!
//! ```text
//! save(server, tools)
//!   └─ probe embedding ─► DimensionReconciler ─► per tool: embed ─► upsert
//! search(query) / list_all()
//!   └─ similarity search ─► ResultTransformer ─► VectorizedTool
//! ```
//!
//! Configuration is read through a [`ConfigSource`] at the start of every
//! operation, so toggling smart routing takes effect immediately.

pub mod config;
pub mod error;
pub mod sync;
pub mod tool;
pub mod transform;

pub use config::{
    ConfigSource, DEFAULT_API_BASE_URL, EnvConfigSource, SharedConfig, SmartRoutingConfig,
};
pub use error::{Result, SyncError};
pub use sync::{
    DEFAULT_SEARCH_LIMIT, DEFAULT_SEARCH_THRESHOLD, LIST_ALL_LIMIT, SaveReport, SearchOptions,
    ToolEmbeddingSync,
};
pub use tool::{Tool, tool_key};
pub use transform::{ResultTransformer, UNKNOWN_SERVER, VectorizedTool};
