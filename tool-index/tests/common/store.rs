use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use toolhub_vector_store::{
    ConnectionLifecycle, DataSource, EmbeddingRepository, MemoryRepository, NewEmbedding,
    Result, SimilarityRow, StoreError, StoredEmbedding,
};

/// Store double that models the vector column on top of a
/// [`MemoryRepository`].
///
/// Understands the statements the reconciler and index manager issue:
/// `pg_attribute` width lookups, `pg_indexes` lookups, row width inference,
/// `DELETE ... WHERE dimensions != $1`, `ALTER TABLE ... TYPE vector(n)` and
/// index DDL.
/// Every statement is logged.
#[derive(Default)]
pub struct FakeStore {
    repo: MemoryRepository,
    schema: Mutex<Schema>,
    statements: Mutex<Vec<String>>,
    statement_failures: Mutex<Vec<(String, String)>>,
    save_failures: Mutex<HashSet<String>>,
    search_rows: Mutex<Option<Vec<SimilarityRow>>>,
    fail_searches: Mutex<bool>,
    fail_initialize: Mutex<bool>,
    initialize_calls: AtomicUsize,
}

#[derive(Default)]
struct Schema {
    declared: Option<usize>,
    index: Option<String>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Column already declared with `width`.
    pub fn with_declared_width(self, width: usize) -> Self {
        lock(&self.schema).declared = Some(width);
        self
    }

    /// Pretend an index named `kind` exists.
    pub fn with_index(self, kind: &str) -> Self {
        lock(&self.schema).index = Some(kind.to_string());
        self
    }

    /// Statements containing `pattern` fail with `message`.
    pub fn fail_statements(self, pattern: &str, message: &str) -> Self {
        lock(&self.statement_failures).push((pattern.to_string(), message.to_string()));
        self
    }

    /// Writes of the record with `entity_key` fail.
    pub fn fail_save_of(self, entity_key: &str) -> Self {
        lock(&self.save_failures).insert(entity_key.to_string());
        self
    }

    /// Every similarity search fails.
    pub fn fail_searches(self) -> Self {
        *lock(&self.fail_searches) = true;
        self
    }

    /// `initialize` fails.
    pub fn fail_initialize(self) -> Self {
        *lock(&self.fail_initialize) = true;
        self
    }

    /// Searches return exactly `rows` instead of ranking stored records.
    pub fn with_search_rows(self, rows: Vec<SimilarityRow>) -> Self {
        *lock(&self.search_rows) = Some(rows);
        self
    }

    /// Store `count` tool records of `server` with vectors of `width`.
    pub async fn seed(&self, server: &str, count: usize, width: usize) {
        for i in 0..count {
            let mut embedding = vec![0.0; width];
            if let Some(first) = embedding.first_mut() {
                *first = 1.0;
            }
            let record = NewEmbedding {
                entity_type: "tool".to_string(),
                entity_key: format!("{server}:seed_{i}"),
                text_content: format!("seed_{i}"),
                embedding,
                metadata: serde_json::json!({ "serverName": server, "toolName": format!("seed_{i}") }),
                model: "seed".to_string(),
            };
            let _ = self.repo.save_embedding(record).await;
        }
    }

    pub fn repository(&self) -> &MemoryRepository {
        &self.repo
    }

    pub async fn records(&self) -> Vec<StoredEmbedding> {
        self.repo.records().await
    }

    /// Widths of stored records, sorted.
    pub async fn row_widths(&self) -> Vec<usize> {
        let mut widths: Vec<_> = self.repo.records().await.iter().map(|r| r.dimensions).collect();
        widths.sort_unstable();
        widths
    }

    pub fn declared_width(&self) -> Option<usize> {
        lock(&self.schema).declared
    }

    /// Kind of the current index: `hnsw`, `hnsw-halfvec` or `ivfflat`.
    pub fn index(&self) -> Option<String> {
        lock(&self.schema).index.clone()
    }

    pub fn statements(&self) -> Vec<String> {
        lock(&self.statements).clone()
    }

    /// Statements that change schema or delete data.
    pub fn destructive_statements(&self) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|s| {
                s.starts_with("DROP") || s.starts_with("DELETE") || s.starts_with("ALTER")
            })
            .collect()
    }

    pub fn clear_statements(&self) {
        lock(&self.statements).clear();
    }

    pub fn initialize_calls(&self) -> usize {
        self.initialize_calls.load(Ordering::SeqCst)
    }

    fn scripted_failure(&self, sql: &str) -> Option<StoreError> {
        lock(&self.statement_failures)
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, message)| StoreError::Query(message.clone()))
    }

    async fn most_common_width(&self) -> Option<usize> {
        let mut counts: HashMap<usize, usize> = HashMap::new();
        for record in self.repo.records().await {
            *counts.entry(record.dimensions).or_default() += 1;
        }
        counts
            .into_iter()
            .max_by_key(|(width, count)| (*count, *width))
            .map(|(width, _)| width)
    }
}

/// Width inside `vector(<n>)`.
fn parse_vector_width(sql: &str) -> Option<usize> {
    let start = sql.find("vector(")? + "vector(".len();
    let end = sql[start..].find(')')? + start;
    sql[start..end].parse().ok()
}

fn index_kind(sql: &str) -> &'static str {
    if sql.contains("halfvec") {
        "hnsw-halfvec"
    } else if sql.contains("ivfflat") {
        "ivfflat"
    } else {
        "hnsw"
    }
}

#[async_trait]
impl DataSource for FakeStore {
    async fn execute(&self, sql: &str, params: &[i64]) -> Result<u64> {
        lock(&self.statements).push(sql.to_string());

        if let Some(error) = self.scripted_failure(sql) {
            return Err(error);
        }

        if sql.starts_with("DROP INDEX") {
            lock(&self.schema).index = None;
            Ok(0)
        } else if sql.starts_with("CREATE INDEX") {
            lock(&self.schema).index = Some(index_kind(sql).to_string());
            Ok(0)
        } else if sql.starts_with("DELETE FROM") {
            let width = params.first().copied().unwrap_or_default() as usize;
            Ok(self.repo.retain_width(width).await)
        } else if sql.starts_with("ALTER TABLE") {
            let width = parse_vector_width(sql)
                .ok_or_else(|| StoreError::Query(format!("unparseable statement: {sql}")))?;
            if self.repo.records().await.iter().any(|r| r.dimensions != width) {
                return Err(StoreError::Query(format!("expected {width} dimensions")));
            }
            lock(&self.schema).declared = Some(width);
            Ok(0)
        } else {
            Ok(0)
        }
    }

    async fn fetch_optional_i64(&self, sql: &str, _params: &[i64]) -> Result<Option<i64>> {
        lock(&self.statements).push(sql.to_string());

        if let Some(error) = self.scripted_failure(sql) {
            return Err(error);
        }

        if sql.contains("pg_attribute") {
            // An unconstrained column reports -1.
            Ok(Some(self.declared_width().map_or(-1, |w| w as i64)))
        } else if sql.contains("GROUP BY dimensions") {
            Ok(self.most_common_width().await.map(|w| w as i64))
        } else if sql.contains("pg_indexes") {
            Ok(self.index().map(|_| 1))
        } else {
            Ok(None)
        }
    }
}

#[async_trait]
impl EmbeddingRepository for FakeStore {
    async fn save_embedding(&self, record: NewEmbedding) -> Result<()> {
        if lock(&self.save_failures).contains(&record.entity_key) {
            return Err(StoreError::Query(format!(
                "insert of {} rejected",
                record.entity_key
            )));
        }
        match self.declared_width() {
            Some(declared) if declared != record.dimensions() => {
                return Err(StoreError::Query(format!(
                    "expected {declared} dimensions, not {}",
                    record.dimensions()
                )));
            }
            _ => {}
        }
        self.repo.save_embedding(record).await
    }

    async fn search_similar(
        &self,
        probe: &[f32],
        limit: usize,
        threshold: f32,
        entity_types: &[&str],
    ) -> Result<Vec<SimilarityRow>> {
        if *lock(&self.fail_searches) {
            return Err(StoreError::Query("search failed".to_string()));
        }
        let scripted = lock(&self.search_rows).clone();
        match scripted {
            Some(rows) => Ok(rows),
            None => {
                self.repo
                    .search_similar(probe, limit, threshold, entity_types)
                    .await
            }
        }
    }

    async fn delete_by_server_name(&self, server_name: &str) -> Result<u64> {
        self.repo.delete_by_server_name(server_name).await
    }
}

#[async_trait]
impl ConnectionLifecycle for FakeStore {
    fn is_connected(&self) -> bool {
        self.repo.is_connected()
    }

    async fn initialize(&self) -> Result<()> {
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        if *lock(&self.fail_initialize) {
            return Err(StoreError::NotConnected);
        }
        self.repo.initialize().await
    }
}
