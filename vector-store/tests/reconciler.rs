//! Dimension reconciliation against a scripted vector column.

use pretty_assertions::assert_eq;
use tool_index_test_support::{FakeStore, RecordingSink};
use toolhub_embeddings::EmbeddingEvent;
use toolhub_vector_store::{
    ColumnState, DimensionReconciler, IndexKind, StoreError, WidthSource,
};

#[tokio::test]
async fn test_uninitialized_column_is_declared_and_indexed() {
    let store = FakeStore::new();
    let outcome = DimensionReconciler::new()
        .reconcile(&store, 1536)
        .await
        .unwrap();

    assert_eq!(outcome.state, ColumnState::Uninitialized);
    assert_eq!(outcome.width, 1536);
    assert_eq!(outcome.purged, 0);
    assert_eq!(
        outcome.index.and_then(|i| i.kind),
        Some(IndexKind::Hnsw)
    );
    assert_eq!(store.declared_width(), Some(1536));
    assert_eq!(store.index().as_deref(), Some("hnsw"));
    assert!(!store.statements().iter().any(|s| s.starts_with("DELETE")));
}

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let store = FakeStore::new();
    let reconciler = DimensionReconciler::new();

    reconciler.reconcile(&store, 768).await.unwrap();
    store.clear_statements();

    let second = reconciler.reconcile(&store, 768).await.unwrap();
    assert_eq!(second.state, ColumnState::Consistent { width: 768 });
    assert!(!second.migrated());
    assert_eq!(store.destructive_statements(), Vec::<String>::new());
    assert!(
        !store
            .statements()
            .iter()
            .any(|s| s.starts_with("CREATE INDEX"))
    );
}

#[tokio::test]
async fn test_width_change_purges_alters_and_reindexes() {
    let store = FakeStore::new().with_declared_width(1024).with_index("hnsw");
    store.seed("old", 3, 1024).await;

    let sink = RecordingSink::new();
    let outcome = DimensionReconciler::new()
        .with_events(sink.clone())
        .reconcile(&store, 1536)
        .await
        .unwrap();

    assert_eq!(
        outcome.state,
        ColumnState::Mismatched {
            current: 1024,
            required: 1536
        }
    );
    assert_eq!(outcome.purged, 3);
    assert!(store.records().await.is_empty());
    assert_eq!(store.declared_width(), Some(1536));
    assert_eq!(store.index().as_deref(), Some("hnsw"));

    let destructive = store.destructive_statements();
    assert_eq!(
        destructive,
        vec![
            "DROP INDEX IF EXISTS idx_vector_embeddings_embedding".to_string(),
            "DELETE FROM vector_embeddings WHERE dimensions != $1".to_string(),
            "ALTER TABLE vector_embeddings ALTER COLUMN embedding TYPE vector(1536)".to_string(),
            "DROP INDEX IF EXISTS idx_vector_embeddings_embedding".to_string(),
        ]
    );
    assert!(
        store
            .statements()
            .last()
            .is_some_and(|s| s.starts_with("CREATE INDEX"))
    );

    let events = sink.events();
    assert_eq!(
        events[0],
        EmbeddingEvent::DimensionMismatchDetected {
            from: 1024,
            to: 1536
        }
    );
    assert!(events.contains(&EmbeddingEvent::StaleRecordsPurged {
        count: 3,
        width: 1536
    }));
    assert!(events.contains(&EmbeddingEvent::IndexCreated {
        kind: "hnsw".to_string(),
        width: 1536
    }));
}

#[tokio::test]
async fn test_rows_of_the_required_width_survive() {
    let store = FakeStore::new();
    store.seed("old", 2, 1024).await;
    store.seed("new", 1, 1536).await;

    let outcome = DimensionReconciler::new()
        .reconcile(&store, 1536)
        .await
        .unwrap();

    assert_eq!(
        outcome.state,
        ColumnState::Mismatched {
            current: 1024,
            required: 1536
        }
    );
    assert_eq!(outcome.purged, 2);
    assert_eq!(store.row_widths().await, vec![1536]);
}

#[tokio::test]
async fn test_width_falls_back_to_stored_rows() {
    let store = FakeStore::new();
    store.seed("a", 2, 768).await;
    let reconciler = DimensionReconciler::new();

    let current = reconciler.current_width(&store).await.unwrap();
    assert_eq!(current.width, 768);
    assert_eq!(current.source, WidthSource::Inferred);

    let outcome = reconciler.reconcile(&store, 768).await.unwrap();
    assert_eq!(outcome.state, ColumnState::Consistent { width: 768 });
    assert_eq!(outcome.purged, 0);
    assert_eq!(store.declared_width(), Some(768));
    assert_eq!(store.row_widths().await, vec![768, 768]);
}

#[tokio::test]
async fn test_current_width_of_empty_store() {
    let store = FakeStore::new();
    let current = DimensionReconciler::new()
        .current_width(&store)
        .await
        .unwrap();
    assert_eq!(current.width, 0);
    assert_eq!(current.source, WidthSource::Unknown);
}

#[tokio::test]
async fn test_alter_failure_propagates() {
    let store = FakeStore::new()
        .with_declared_width(1024)
        .fail_statements("ALTER TABLE", "permission denied");

    let err = DimensionReconciler::new()
        .reconcile(&store, 1536)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Query(ref m) if m == "permission denied"));
    assert_eq!(store.declared_width(), Some(1024));
}

#[tokio::test]
async fn test_index_failure_fails_the_pass() {
    let store = FakeStore::new().fail_statements("CREATE INDEX", "disk full");

    let err = DimensionReconciler::new()
        .reconcile(&store, 1536)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Index(ref m) if m.contains("disk full")), "{err}");
    assert_eq!(store.declared_width(), Some(1536));
    assert_eq!(store.index(), None);
}

#[tokio::test]
async fn test_missing_index_is_rebuilt_on_consistent_column() {
    let store = FakeStore::new().with_declared_width(1536);
    store.seed("docs", 2, 1536).await;

    let outcome = DimensionReconciler::new()
        .reconcile(&store, 1536)
        .await
        .unwrap();

    assert_eq!(outcome.state, ColumnState::Consistent { width: 1536 });
    assert_eq!(outcome.purged, 0);
    assert_eq!(
        outcome.index.and_then(|i| i.kind),
        Some(IndexKind::Hnsw)
    );
    assert_eq!(store.index().as_deref(), Some("hnsw"));
    assert_eq!(store.row_widths().await, vec![1536, 1536]);
    assert!(
        !store
            .statements()
            .iter()
            .any(|s| s.starts_with("DELETE") || s.starts_with("ALTER"))
    );
}

#[tokio::test]
async fn test_unindexable_width_is_reported_not_raised() {
    let store = FakeStore::new();
    let reconciler = DimensionReconciler::new();

    let outcome = reconciler.reconcile(&store, 5000).await.unwrap();
    let index = outcome.index.unwrap();
    assert!(!index.success);
    assert!(index.message.contains("4000"), "{}", index.message);
    assert_eq!(store.declared_width(), Some(5000));

    let again = reconciler.reconcile(&store, 5000).await.unwrap();
    assert_eq!(again.state, ColumnState::Consistent { width: 5000 });
    assert_eq!(again.index, None);
}

#[tokio::test]
async fn test_wide_models_get_halfvec_index() {
    let store = FakeStore::new();
    let outcome = DimensionReconciler::new()
        .reconcile(&store, 3072)
        .await
        .unwrap();
    assert_eq!(
        outcome.index.and_then(|i| i.kind),
        Some(IndexKind::HnswHalfvec)
    );
}

#[tokio::test]
async fn test_zero_width_is_rejected() {
    let store = FakeStore::new();
    let err = DimensionReconciler::new()
        .reconcile(&store, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidInput(_)));
    assert!(store.statements().is_empty());
}
