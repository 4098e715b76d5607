//! Keeps stored tool embeddings in step with what servers advertise.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use toolhub_embeddings::events::{SharedEventSink, default_sink};
use toolhub_embeddings::{
    EmbeddingGenerator, HttpTransportFactory, TransportFactory, expected_dimensions,
};
use toolhub_vector_store::{
    ConnectionLifecycle, DataSource, DimensionReconciler, EmbeddingRepository, NewEmbedding,
    PgVectorStore, SimilarityRow, TOOL_ENTITY_TYPE,
};

use crate::config::{ConfigSource, SmartRoutingConfig};
use crate::error::{Result, SyncError};
use crate::tool::{Tool, tool_key};
use crate::transform::{ResultTransformer, VectorizedTool};

/// Text embedded to discover the width the model currently produces.
const PROBE_TEXT: &str = "test";

/// Default number of search results.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Default minimum similarity for search results.
pub const DEFAULT_SEARCH_THRESHOLD: f32 = 0.7;

/// Most tools returned by [`ToolEmbeddingSync::list_all`].
pub const LIST_ALL_LIMIT: usize = 1000;

/// Outcome of saving one server's tools.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    /// Width every saved vector has. 0 when nothing ran.
    pub dimensions: usize,

    /// Tools written.
    pub succeeded: Vec<String>,

    /// Tools skipped, with the reason.
    pub failed: Vec<(String, String)>,
}

impl SaveReport {
    fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            ..Self::default()
        }
    }

    fn record(mut self, tool: &str, result: std::result::Result<(), String>) -> Self {
        match result {
            Ok(()) => self.succeeded.push(tool.to_string()),
            Err(reason) => self.failed.push((tool.to_string(), reason)),
        }
        self
    }

    /// Whether every tool was written.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Options for [`ToolEmbeddingSync::search`].
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    /// Most results to return.
    pub limit: usize,

    /// Minimum cosine similarity.
    pub threshold: f32,

    /// Only return tools of these servers.
    pub server_names: Option<Vec<String>>,
}

impl SearchOptions {
    /// Set the result limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Set the similarity threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Restrict results to the given servers.
    pub fn with_servers<I, S>(mut self, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.server_names = Some(servers.into_iter().map(Into::into).collect());
        self
    }
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_SEARCH_LIMIT,
            threshold: DEFAULT_SEARCH_THRESHOLD,
            server_names: None,
        }
    }
}

/// Saves, searches and removes per-tool embeddings.
///
/// The configuration is read at the start of every operation. Saves are
/// serialized: a batch holds the writer lock from the probe through the
/// last tool write, so a width migration never interleaves with writes of
/// another width from this process.
pub struct ToolEmbeddingSync {
    config: Arc<dyn ConfigSource>,
    repository: Arc<dyn EmbeddingRepository>,
    source: Arc<dyn DataSource>,
    lifecycle: Arc<dyn ConnectionLifecycle>,
    transports: Arc<dyn TransportFactory>,
    reconciler: DimensionReconciler,
    transformer: ResultTransformer,
    events: SharedEventSink,
    writer: Mutex<()>,
}

impl ToolEmbeddingSync {
    /// Sync against a store that provides all three persistence roles.
    pub fn new<S>(config: Arc<dyn ConfigSource>, store: Arc<S>) -> Self
    where
        S: EmbeddingRepository + DataSource + ConnectionLifecycle + 'static,
    {
        Self::from_parts(config, store.clone(), store.clone(), store)
    }

    /// Sync against separately supplied persistence collaborators.
    pub fn from_parts(
        config: Arc<dyn ConfigSource>,
        repository: Arc<dyn EmbeddingRepository>,
        source: Arc<dyn DataSource>,
        lifecycle: Arc<dyn ConnectionLifecycle>,
    ) -> Self {
        Self {
            config,
            repository,
            source,
            lifecycle,
            transports: Arc::new(HttpTransportFactory::new()),
            reconciler: DimensionReconciler::new(),
            transformer: ResultTransformer,
            events: default_sink(),
            writer: Mutex::new(()),
        }
    }

    /// Sync against the Postgres database named by the configuration.
    ///
    /// The database URL is read when the store first connects, not here.
    /// Changing it afterwards takes effect only in a new sync.
    pub fn postgres(config: Arc<dyn ConfigSource>) -> Self {
        let store = Arc::new(PgVectorStore::with_url_source({
            let config = config.clone();
            move || config.current().db_url
        }));
        Self::new(config, store)
    }

    /// Use a different transport factory.
    pub fn with_transport_factory(mut self, transports: Arc<dyn TransportFactory>) -> Self {
        self.transports = transports;
        self
    }

    /// Use a different reconciler, e.g. for another table.
    pub fn with_reconciler(mut self, reconciler: DimensionReconciler) -> Self {
        self.reconciler = reconciler.with_events(self.events.clone());
        self
    }

    /// Send diagnostics to `events`.
    pub fn with_events(mut self, events: SharedEventSink) -> Self {
        self.reconciler = self.reconciler.with_events(events.clone());
        self.events = events;
        self
    }

    fn generator(&self, config: &SmartRoutingConfig) -> EmbeddingGenerator {
        let settings = config.embedding_settings();
        let transport = self.transports.transport(&settings);
        EmbeddingGenerator::new(transport, settings.model).with_events(self.events.clone())
    }

    async fn ensure_connected(&self) -> Result<()> {
        if !self.lifecycle.is_connected() {
            debug!("Initializing vector store");
            self.lifecycle.initialize().await?;
        }
        Ok(())
    }

    /// Embed and store every tool of `server_name`.
    ///
    /// Does nothing when smart routing is disabled or `tools` is empty. Fails
    /// when the store is unreachable, the probe yields no width, the probe
    /// fell back while the column holds another width, or the dimension
    /// reconciliation fails. Tools that cannot be stored individually are
    /// listed in [`SaveReport::failed`].
    pub async fn save(&self, server_name: &str, tools: &[Tool]) -> Result<SaveReport> {
        let config = self.config.current();
        if !config.enabled {
            debug!("Smart routing disabled, not saving tools of {server_name}");
            return Ok(SaveReport::default());
        }
        if tools.is_empty() {
            return Ok(SaveReport::default());
        }

        let _writer = self.writer.lock().await;
        self.ensure_connected().await?;

        let generator = self.generator(&config);
        let probe = generator.generate_detailed(PROBE_TEXT).await;
        let width = probe.dimensions();
        if width == 0 {
            return Err(SyncError::Probe {
                model: generator.model().to_string(),
                reason: "no dimensions".to_string(),
            });
        }
        if probe.is_fallback() {
            self.check_fallback_width(&generator, width).await?;
        }
        debug!("Probe produced {width} dimensions with model {}", probe.model);

        self.reconciler
            .reconcile(self.source.as_ref(), width)
            .await
            .map_err(|source| SyncError::Reconcile { width, source })?;

        let mut report = SaveReport::new(width);
        for tool in tools {
            let result = self.save_tool(&generator, server_name, tool, width).await;
            if let Err(reason) = &result {
                warn!("Skipping tool {}: {reason}", tool_key(server_name, &tool.name));
            }
            report = report.record(&tool.name, result);
        }

        info!(
            "Saved {} of {} tool embeddings for server {server_name}",
            report.succeeded.len(),
            tools.len()
        );
        Ok(report)
    }

    /// A fallback probe says nothing about the API's width. It may only
    /// settle the width of an empty column or one already at the fallback
    /// width; anything else would purge vectors the API still produces.
    async fn check_fallback_width(
        &self,
        generator: &EmbeddingGenerator,
        width: usize,
    ) -> Result<()> {
        let current = self
            .reconciler
            .current_width(self.source.as_ref())
            .await
            .map_err(|source| SyncError::Reconcile { width, source })?;

        if current.width == 0 || current.width == width {
            return Ok(());
        }

        warn!(
            "Embedding API unavailable for model {}, keeping {} stored dimensions",
            generator.model(),
            current.width
        );
        Err(SyncError::Probe {
            model: generator.model().to_string(),
            reason: format!(
                "API unavailable, fallback width {width} differs from stored width {}",
                current.width
            ),
        })
    }

    async fn save_tool(
        &self,
        generator: &EmbeddingGenerator,
        server_name: &str,
        tool: &Tool,
        width: usize,
    ) -> std::result::Result<(), String> {
        let text = tool.searchable_text();
        let generated = generator.generate_detailed(&text).await;

        if generated.embedding.iter().any(|v| !v.is_finite()) {
            return Err("embedding contains non-finite values".to_string());
        }
        if generated.dimensions() != width {
            return Err(format!(
                "embedding has {} dimensions, column holds {width}",
                generated.dimensions()
            ));
        }

        let record = NewEmbedding {
            entity_type: TOOL_ENTITY_TYPE.to_string(),
            entity_key: tool_key(server_name, &tool.name),
            text_content: text,
            embedding: generated.embedding,
            metadata: tool.metadata(server_name),
            model: generated.model,
        };

        self.repository
            .save_embedding(record)
            .await
            .map_err(|e| e.to_string())
    }

    /// Save several servers one after another. A failed server does not
    /// stop the rest.
    pub async fn save_all(
        &self,
        servers: &[(String, Vec<Tool>)],
    ) -> Vec<(String, Result<SaveReport>)> {
        let mut results = Vec::with_capacity(servers.len());
        for (server_name, tools) in servers {
            let result = self.save(server_name, tools).await;
            if let Err(e) = &result {
                warn!("Failed to save tool embeddings for server {server_name}: {e}");
            }
            results.push((server_name.clone(), result));
        }
        results
    }

    /// Tools most similar to `query`. Errors yield no results.
    pub async fn search(&self, query: &str, options: &SearchOptions) -> Vec<VectorizedTool> {
        let config = self.config.current();
        if !config.enabled {
            debug!("Smart routing disabled, skipping tool search");
            return Vec::new();
        }

        match self.try_search(&config, query, options).await {
            Ok(tools) => tools,
            Err(e) => {
                warn!("Tool search failed: {e}");
                Vec::new()
            }
        }
    }

    async fn try_search(
        &self,
        config: &SmartRoutingConfig,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<VectorizedTool>> {
        self.ensure_connected().await?;

        let probe = self.generator(config).generate(query).await;
        let rows = self
            .repository
            .search_similar(&probe, options.limit, options.threshold, &[TOOL_ENTITY_TYPE])
            .await?;

        Ok(self.to_tools(&rows, options.server_names.as_deref()))
    }

    /// Every stored tool, optionally restricted to some servers. Errors
    /// yield no results.
    pub async fn list_all(&self, server_names: Option<&[String]>) -> Vec<VectorizedTool> {
        let config = self.config.current();
        match self.try_list_all(&config, server_names).await {
            Ok(tools) => tools,
            Err(e) => {
                warn!("Listing tool embeddings failed: {e}");
                Vec::new()
            }
        }
    }

    async fn try_list_all(
        &self,
        config: &SmartRoutingConfig,
        server_names: Option<&[String]>,
    ) -> Result<Vec<VectorizedTool>> {
        self.ensure_connected().await?;

        let width = match self.reconciler.current_width(self.source.as_ref()).await {
            Ok(current) if current.width > 0 => current.width,
            Ok(_) => expected_dimensions(&config.embedding_settings().model),
            Err(e) => {
                debug!("Could not read vector width, using model default: {e}");
                expected_dimensions(&config.embedding_settings().model)
            }
        };

        // A zero probe scores 0 against everything, so -1 admits every row.
        let probe = vec![0.0; width];
        let rows = self
            .repository
            .search_similar(&probe, LIST_ALL_LIMIT, -1.0, &[TOOL_ENTITY_TYPE])
            .await?;

        Ok(self.to_tools(&rows, server_names))
    }

    fn to_tools(
        &self,
        rows: &[SimilarityRow],
        server_names: Option<&[String]>,
    ) -> Vec<VectorizedTool> {
        self.transformer
            .transform_all(rows)
            .into_iter()
            .filter(|tool| {
                server_names.is_none_or(|names| names.iter().any(|n| *n == tool.server_name))
            })
            .collect()
    }

    /// Delete every stored tool of `server_name`. Failures are logged only.
    pub async fn remove(&self, server_name: &str) {
        let result = async {
            self.ensure_connected().await?;
            self.repository
                .delete_by_server_name(server_name)
                .await
                .map_err(SyncError::from)
        }
        .await;

        match result {
            Ok(count) => info!("Removed {count} tool embeddings for server {server_name}"),
            Err(e) => warn!("Failed to remove tool embeddings for server {server_name}: {e}"),
        }
    }

    /// Width of the stored vectors: declared, else inferred from rows, else 0.
    pub async fn current_dimensions(&self) -> Result<usize> {
        self.ensure_connected().await?;
        let current = self.reconciler.current_width(self.source.as_ref()).await?;
        Ok(current.width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_report_records_outcomes() {
        let report = SaveReport::new(1536)
            .record("a", Ok(()))
            .record("b", Err("too short".to_string()));

        assert_eq!(report.succeeded, vec!["a".to_string()]);
        assert_eq!(report.failed, vec![("b".to_string(), "too short".to_string())]);
        assert!(!report.is_complete());
    }

    #[test]
    fn test_search_defaults() {
        let options = SearchOptions::default();
        assert_eq!(options.limit, 10);
        assert_eq!(options.threshold, 0.7);
        assert_eq!(options.server_names, None);

        let options = options.with_servers(["a"]).with_limit(3);
        assert_eq!(options.server_names, Some(vec!["a".to_string()]));
        assert_eq!(options.limit, 3);
    }
}
