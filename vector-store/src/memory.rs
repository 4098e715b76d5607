//! In-process embedding repository.
//!
//! Holds records in a map keyed by `(entity_type, entity_key)` and answers
//! similarity queries with a linear cosine scan. Useful for tests and for
//! running without a database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use ordered_float::OrderedFloat;
use tokio::sync::RwLock;
use tracing::debug;

use toolhub_embeddings::cosine_similarity;

use crate::error::Result;
use crate::record::{NewEmbedding, RowEmbedding, SimilarityRow, StoredEmbedding};
use crate::source::{ConnectionLifecycle, EmbeddingRepository};

type Key = (String, String);

/// Embedding repository backed by a `HashMap`.
#[derive(Default)]
pub struct MemoryRepository {
    records: RwLock<HashMap<Key, StoredEmbedding>>,
    connected: AtomicBool,
}

impl MemoryRepository {
    /// Create an empty, not yet initialized repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Look up a record by natural key.
    pub async fn get(&self, entity_type: &str, entity_key: &str) -> Option<StoredEmbedding> {
        self.records
            .read()
            .await
            .get(&(entity_type.to_string(), entity_key.to_string()))
            .cloned()
    }

    /// Every stored record, ordered by key.
    pub async fn records(&self) -> Vec<StoredEmbedding> {
        let mut records: Vec<_> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| {
            a.entity_type
                .cmp(&b.entity_type)
                .then_with(|| a.entity_key.cmp(&b.entity_key))
        });
        records
    }

    /// Drop every record whose width differs from `width`.
    pub async fn retain_width(&self, width: usize) -> u64 {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| r.dimensions == width);
        (before - records.len()) as u64
    }
}

#[async_trait]
impl EmbeddingRepository for MemoryRepository {
    async fn save_embedding(&self, record: NewEmbedding) -> Result<()> {
        let key = (record.entity_type.clone(), record.entity_key.clone());
        debug!("Storing embedding {}:{}", key.0, key.1);
        self.records.write().await.insert(key, record.into());
        Ok(())
    }

    async fn search_similar(
        &self,
        probe: &[f32],
        limit: usize,
        threshold: f32,
        entity_types: &[&str],
    ) -> Result<Vec<SimilarityRow>> {
        let records = self.records.read().await;

        let mut hits: Vec<(OrderedFloat<f32>, &StoredEmbedding)> = records
            .values()
            .filter(|r| entity_types.is_empty() || entity_types.contains(&r.entity_type.as_str()))
            .filter_map(|r| {
                cosine_similarity(probe, &r.embedding).map(|score| (OrderedFloat(score), r))
            })
            .filter(|(score, _)| score.0 >= threshold)
            .collect();

        hits.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.entity_key.cmp(&b.1.entity_key)));
        hits.truncate(limit);

        Ok(hits
            .into_iter()
            .map(|(score, r)| SimilarityRow {
                similarity: score.0,
                embedding: RowEmbedding {
                    text_content: r.text_content.clone(),
                    metadata: Some(r.metadata.clone()),
                },
            })
            .collect())
    }

    async fn delete_by_server_name(&self, server_name: &str) -> Result<u64> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| {
            r.metadata.get("serverName").and_then(serde_json::Value::as_str) != Some(server_name)
        });
        Ok((before - records.len()) as u64)
    }
}

#[async_trait]
impl ConnectionLifecycle for MemoryRepository {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn initialize(&self) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }
}
