//! Configuration for smart routing.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use toolhub_embeddings::{DEFAULT_EMBEDDING_MODEL, EmbeddingSettings};

/// Official embeddings endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";

/// Environment variables read by [`EnvConfigSource`].
pub mod env {
    /// `true`/`1`/`yes`/`on` turns smart routing on.
    pub const ENABLED: &str = "SMART_ROUTING_ENABLED";
    /// API key for the embeddings endpoint.
    pub const API_KEY: &str = "OPENAI_API_KEY";
    /// Base URL of the embeddings endpoint.
    pub const API_BASE_URL: &str = "OPENAI_API_BASE_URL";
    /// Embedding model.
    pub const EMBEDDING_MODEL: &str = "OPENAI_API_EMBEDDING_MODEL";
    /// Postgres connection string.
    pub const DB_URL: &str = "SMART_ROUTING_DB_URL";
}

/// Settings for the tool index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SmartRoutingConfig {
    /// Whether tools are embedded and searchable at all.
    pub enabled: bool,

    /// API key for the embeddings endpoint.
    pub api_key: String,

    /// Base URL of the embeddings endpoint.
    pub api_base_url: String,

    /// Embedding model.
    pub embedding_model: String,

    /// Postgres connection string.
    pub db_url: String,
}

impl SmartRoutingConfig {
    /// Enabled configuration for `api_key` against the official endpoint.
    pub fn enabled(api_key: impl Into<String>) -> Self {
        Self {
            enabled: true,
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Set the base URL.
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Set the embedding model.
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// Set the database URL.
    pub fn with_db_url(mut self, url: impl Into<String>) -> Self {
        self.db_url = url.into();
        self
    }

    /// Connection settings for the embeddings crate. Blank fields fall back
    /// to the defaults.
    pub fn embedding_settings(&self) -> EmbeddingSettings {
        let base_url = non_blank(&self.api_base_url).unwrap_or(DEFAULT_API_BASE_URL);
        let model = non_blank(&self.embedding_model).unwrap_or(DEFAULT_EMBEDDING_MODEL);
        EmbeddingSettings::new(self.api_key.trim())
            .with_base_url(base_url)
            .with_model(model)
    }
}

impl Default for SmartRoutingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            db_url: String::new(),
        }
    }
}

fn non_blank(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

/// Supplies the configuration in effect right now.
///
/// Consulted once per operation, so a change takes effect on the next call.
pub trait ConfigSource: Send + Sync {
    /// Current configuration.
    fn current(&self) -> SmartRoutingConfig;
}

impl ConfigSource for SmartRoutingConfig {
    fn current(&self) -> SmartRoutingConfig {
        self.clone()
    }
}

/// Configuration that can be replaced at runtime.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<SmartRoutingConfig>>,
}

impl SharedConfig {
    /// Wrap `config`.
    pub fn new(config: SmartRoutingConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Replace the configuration.
    pub fn set(&self, config: SmartRoutingConfig) {
        match self.inner.write() {
            Ok(mut guard) => *guard = config,
            Err(poisoned) => *poisoned.into_inner() = config,
        }
    }

    /// Change the configuration in place.
    pub fn update(&self, f: impl FnOnce(&mut SmartRoutingConfig)) {
        match self.inner.write() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

impl ConfigSource for SharedConfig {
    fn current(&self) -> SmartRoutingConfig {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Reads the configuration from the environment on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvConfigSource;

impl EnvConfigSource {
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> SmartRoutingConfig {
        let defaults = SmartRoutingConfig::default();
        SmartRoutingConfig {
            enabled: lookup(env::ENABLED).is_some_and(|v| parse_flag(&v)),
            api_key: lookup(env::API_KEY).unwrap_or_default(),
            api_base_url: lookup(env::API_BASE_URL).unwrap_or(defaults.api_base_url),
            embedding_model: lookup(env::EMBEDDING_MODEL).unwrap_or(defaults.embedding_model),
            db_url: lookup(env::DB_URL).unwrap_or_default(),
        }
    }
}

impl ConfigSource for EnvConfigSource {
    fn current(&self) -> SmartRoutingConfig {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
