use super::*;
use crate::config::{Config, LlmConfig, StoreConfig};
use tempfile::TempDir;

/// Deterministic fake embedder: identical text always produces the
/// identical vector, so the stored document is its own nearest neighbor
struct CharCountEmbedder;

impl EmbeddingModel for CharCountEmbedder {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let letters = text.chars().filter(|c| c.is_alphabetic()).count() as f32;
        let digits = text.chars().filter(|c| c.is_ascii_digit()).count() as f32;
        let spaces = text.chars().filter(|c| c.is_whitespace()).count() as f32;
        let total = text.chars().count() as f32;
        Ok(vec![letters, digits, spaces, total])
    }
}

fn create_test_config(dir: &TempDir) -> Config {
    Config {
        llm: LlmConfig {
            embedding_dimension: 64,
            ..LlmConfig::default()
        },
        store: StoreConfig {
            collection: "test-parts".to_string(),
        },
        base_dir: dir.path().to_path_buf(),
    }
}

fn record(text: &str) -> ProductRecord {
    ProductRecord {
        text: text.to_string(),
    }
}

#[tokio::test]
async fn open_is_idempotent() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);

    let mut store = EmbeddingStore::open(&config, Arc::new(CharCountEmbedder))
        .await
        .expect("open should succeed");
    assert_eq!(store.collection_name(), "test-parts");

    store
        .populate(&[record("replacement water filter")])
        .await
        .expect("populate should succeed");

    // Re-opening references the same on-disk collection
    let reopened = EmbeddingStore::open(&config, Arc::new(CharCountEmbedder))
        .await
        .expect("open should succeed");
    assert_eq!(reopened.count().await.expect("count should succeed"), 1);
}

#[tokio::test]
async fn populate_then_search_round_trip() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let mut store = EmbeddingStore::open(&config, Arc::new(CharCountEmbedder))
        .await
        .expect("open should succeed");

    let records = vec![
        record("Drain pump assembly for front-load washers, includes gasket."),
        record("Refrigerator door shelf bin, clear plastic, fits 12 models."),
        record("Oven igniter with mounting bracket and wire nuts."),
    ];

    let added = store
        .populate(&records)
        .await
        .expect("populate should succeed");
    assert_eq!(added, 3);

    // Querying with the exact stored text returns that text as the top hit
    let results = store
        .search("Oven igniter with mounting bracket and wire nuts.", 1)
        .await
        .expect("search should succeed");
    assert_eq!(
        results,
        vec!["Oven igniter with mounting bracket and wire nuts.".to_string()]
    );
}

#[tokio::test]
async fn search_empty_store_returns_no_results() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let store = EmbeddingStore::open(&config, Arc::new(CharCountEmbedder))
        .await
        .expect("open should succeed");

    let results = store
        .search("anything at all", 5)
        .await
        .expect("search should not fail on an empty store");
    assert!(results.is_empty());
}

#[tokio::test]
async fn populate_does_not_deduplicate() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let mut store = EmbeddingStore::open(&config, Arc::new(CharCountEmbedder))
        .await
        .expect("open should succeed");

    let records = vec![record("Identical ice maker kit.")];
    store
        .populate(&records)
        .await
        .expect("populate should succeed");
    store
        .populate(&records)
        .await
        .expect("populate should succeed");

    assert_eq!(store.count().await.expect("count should succeed"), 2);
}

#[tokio::test]
async fn delete_collection_then_search_yields_nothing() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let mut store = EmbeddingStore::open(&config, Arc::new(CharCountEmbedder))
        .await
        .expect("open should succeed");

    store
        .populate(&[record("Compressor start relay."), record("Door boot seal.")])
        .await
        .expect("populate should succeed");
    assert_eq!(store.count().await.expect("count should succeed"), 2);

    store
        .delete_collection()
        .await
        .expect("delete should succeed");

    assert_eq!(store.count().await.expect("count should succeed"), 0);
    let results = store
        .search("Compressor start relay.", 3)
        .await
        .expect("search should not fail after delete");
    assert!(results.is_empty());

    // Deleting again is a no-op
    store
        .delete_collection()
        .await
        .expect("repeat delete should succeed");
}

#[tokio::test]
async fn empty_populate_is_a_no_op() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let mut store = EmbeddingStore::open(&config, Arc::new(CharCountEmbedder))
        .await
        .expect("open should succeed");

    let added = store.populate(&[]).await.expect("populate should succeed");
    assert_eq!(added, 0);
    assert_eq!(store.count().await.expect("count should succeed"), 0);
}

#[tokio::test]
async fn context_source_retrieves_documents() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let mut store = EmbeddingStore::open(&config, Arc::new(CharCountEmbedder))
        .await
        .expect("open should succeed");

    store
        .populate(&[record("Thermostat for chest freezers.")])
        .await
        .expect("populate should succeed");

    let source: &dyn ContextSource = &store;
    let documents = source
        .retrieve("Thermostat for chest freezers.", 1)
        .await
        .expect("retrieve should succeed");
    assert_eq!(documents, vec!["Thermostat for chest freezers.".to_string()]);
}
