//! Embedding transports.
//!
//! Two strategies talk to an embedding API:
//!
//! - [`VendorTransport`] uses the vendor client and is selected only for the
//!   official endpoint.
//! - [`DirectTransport`] posts to `<base_url>/embeddings` itself. Self-hosted
//!   OpenAI-compatible servers go through this path because client-library
//!   response handling has been seen to mangle their output.
//!
//! [`TransportKind::select`] decides which one applies.

use std::sync::Arc;
use std::time::Duration;

use async_openai::Client;
use async_openai::config::{OPENAI_API_BASE, OpenAIConfig};
use async_openai::types::embeddings::{CreateEmbeddingRequestArgs, EmbeddingInput};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::models::requires_task_type;

/// Default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Task type sent to models that need one.
const SEARCH_DOCUMENT_TASK: &str = "search_document";

/// Connection settings for an embedding API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    /// API key. Empty means no `Authorization` header.
    pub api_key: String,

    /// API base URL, e.g. `https://api.openai.com/v1`.
    pub base_url: String,

    /// Embedding model name.
    pub model: String,
}

impl EmbeddingSettings {
    /// Settings for the official endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: OPENAI_API_BASE.to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
        }
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Base URL without trailing slashes.
    fn trimmed_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self::new("")
    }
}

/// Something that turns text into a raw vector.
///
/// Implementations return the vector exactly as received; validation is the
/// caller's job.
#[async_trait]
pub trait EmbeddingTransport: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Request an embedding for `text` from `model`.
    async fn embed(&self, text: &str, model: &str) -> Result<Embedding>;
}

/// Which transport strategy to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Vendor client against the official endpoint.
    Vendor,
    /// Hand-built requests against a compatible server.
    Direct,
}

impl TransportKind {
    /// Pick the strategy for an endpoint.
    ///
    /// An empty base URL means the official endpoint. The API key does not
    /// change the choice; a vendor request without one fails and falls back.
    pub fn select(base_url: &str, _api_key: &str) -> Self {
        let base_url = base_url.trim_end_matches('/');
        if base_url.is_empty() || base_url.eq_ignore_ascii_case(OPENAI_API_BASE) {
            Self::Vendor
        } else {
            Self::Direct
        }
    }
}

/// Builds the transport for a set of settings.
pub trait TransportFactory: Send + Sync {
    /// Transport to use for `settings`.
    fn transport(&self, settings: &EmbeddingSettings) -> Arc<dyn EmbeddingTransport>;
}

/// Factory producing real HTTP transports that share one connection pool.
#[derive(Debug, Clone, Default)]
pub struct HttpTransportFactory {
    http: reqwest::Client,
}

impl HttpTransportFactory {
    /// Create a factory with a fresh HTTP client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing HTTP client, e.g. one configured with timeouts.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl TransportFactory for HttpTransportFactory {
    fn transport(&self, settings: &EmbeddingSettings) -> Arc<dyn EmbeddingTransport> {
        match TransportKind::select(&settings.base_url, &settings.api_key) {
            TransportKind::Vendor => Arc::new(VendorTransport::new(settings, self.http.clone())),
            TransportKind::Direct => Arc::new(DirectTransport::new(settings, self.http.clone())),
        }
    }
}

/// Transport backed by the vendor client.
pub struct VendorTransport {
    client: Client<OpenAIConfig>,
    has_key: bool,
}

impl VendorTransport {
    /// Create a vendor transport. Rate-limit retries are disabled.
    pub fn new(settings: &EmbeddingSettings, http: reqwest::Client) -> Self {
        let base_url = match settings.trimmed_base_url() {
            "" => OPENAI_API_BASE,
            url => url,
        };
        let config = OpenAIConfig::new()
            .with_api_key(&settings.api_key)
            .with_api_base(base_url);
        let no_retry = backoff::ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(Duration::ZERO))
            .build();

        Self {
            client: Client::with_config(config)
                .with_http_client(http)
                .with_backoff(no_retry),
            has_key: !settings.api_key.is_empty(),
        }
    }
}

#[async_trait]
impl EmbeddingTransport for VendorTransport {
    fn name(&self) -> &str {
        "vendor"
    }

    async fn embed(&self, text: &str, model: &str) -> Result<Embedding> {
        if !self.has_key {
            return Err(EmbeddingError::ProviderNotConfigured);
        }

        debug!("Requesting embedding from vendor API with model: {model}");

        let request = CreateEmbeddingRequestArgs::default()
            .model(model)
            .input(EmbeddingInput::String(text.to_string()))
            .build()?;

        let response = self.client.embeddings().create(request).await?;

        response
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .filter(|embedding| !embedding.is_empty())
            .ok_or(EmbeddingError::EmptyResponse)
    }
}

/// Transport posting directly to an OpenAI-compatible `/embeddings` route.
pub struct DirectTransport {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl DirectTransport {
    /// Create a direct transport.
    pub fn new(settings: &EmbeddingSettings, client: reqwest::Client) -> Self {
        Self {
            api_key: settings.api_key.clone(),
            base_url: settings.trimmed_base_url().to_string(),
            client,
        }
    }
}

#[async_trait]
impl EmbeddingTransport for DirectTransport {
    fn name(&self) -> &str {
        "direct"
    }

    async fn embed(&self, text: &str, model: &str) -> Result<Embedding> {
        debug!("Requesting embedding from {} with model: {model}", self.base_url);

        let body = DirectRequest {
            model,
            input: text,
            task_type: requires_task_type(model).then_some(SEARCH_DOCUMENT_TASK),
        };

        let mut request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Content-Type", "application/json")
            .json(&body);
        if !self.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiStatus { status, body });
        }

        let result: DirectResponse = response.json().await?;

        result
            .data
            .into_iter()
            .next()
            .and_then(|item| item.embedding)
            .filter(|embedding| !embedding.is_empty())
            .ok_or(EmbeddingError::EmptyResponse)
    }
}

#[derive(Debug, Serialize)]
struct DirectRequest<'a> {
    model: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_type: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct DirectResponse {
    #[serde(default)]
    data: Vec<DirectEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct DirectEmbeddingData {
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}
