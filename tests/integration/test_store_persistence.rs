//! Store reopen, model checks and concurrent writers.

use crate::common::{FileCaptioner, KeywordEmbedder, TestAlbum, id, record};
use photofind::pipeline::{IngestOptions, IngestionPipeline, QueryEngine, QueryOutcome};
use photofind::vector::{
    FlatIndex, InsertError, METADATA_FILE, RankingPolicy, StoreError, StoreMetadata, VectorIndex,
};
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

const MODEL: &str = "test/keyword";

#[tokio::test]
async fn test_ingested_records_survive_restart() {
    let store = TempDir::new().unwrap();
    let album = TestAlbum::new();
    let files = vec![
        album.add_image("dog.jpg", "a dog on the beach"),
        album.add_image("car.jpg", "a car in the street"),
    ];

    {
        let index = Arc::new(FlatIndex::open(store.path(), MODEL).unwrap());
        let report = IngestionPipeline::new(
            index.clone(),
            Arc::new(FileCaptioner::default()),
            Arc::new(KeywordEmbedder::default()),
            IngestOptions {
                concurrency: 1,
                ..IngestOptions::default()
            },
        )
        .ingest(files)
        .await;
        assert_eq!(report.stored.len(), 2);
    }

    let metadata = StoreMetadata::load(store.path()).unwrap();
    assert_eq!(metadata.model_name, MODEL);
    assert_eq!(metadata.record_count, 2);
    assert_eq!(metadata.dimension, 6);

    let index = Arc::new(FlatIndex::open(store.path(), MODEL).unwrap());
    assert_eq!(index.len(), 2);
    assert!(index.contains(&id("dog.jpg")));

    let engine = QueryEngine::new(
        index,
        Arc::new(KeywordEmbedder::default()),
        RankingPolicy::Cosine,
    );
    let QueryOutcome::Found(matches) = engine.search("car").await.unwrap() else {
        panic!("expected a match after restart");
    };
    assert_eq!(matches[0].id, "car.jpg");
    assert_eq!(matches[0].description, "a car in the street");
}

#[test]
fn test_duplicate_ids_rejected_across_restarts() {
    let store = TempDir::new().unwrap();

    {
        let index = FlatIndex::open(store.path(), MODEL).unwrap();
        index.insert(record("a.jpg", vec![1.0, 0.0])).unwrap();
    }

    let index = FlatIndex::open(store.path(), MODEL).unwrap();
    let err = index.insert(record("a.jpg", vec![0.0, 1.0])).unwrap_err();
    assert!(matches!(err, InsertError::DuplicateId { .. }));

    // Dimension is also fixed by what is on disk
    let err = index.insert(record("b.jpg", vec![1.0, 0.0, 0.0])).unwrap_err();
    assert!(matches!(err, InsertError::DimensionMismatch { expected: 2, .. }));

    drop(index);
    let index = FlatIndex::open(store.path(), MODEL).unwrap();
    assert_eq!(index.len(), 1);
}

#[test]
fn test_different_model_is_refused() {
    let store = TempDir::new().unwrap();

    {
        let index = FlatIndex::open(store.path(), MODEL).unwrap();
        index.insert(record("a.jpg", vec![1.0, 0.0])).unwrap();
    }
    assert!(store.path().join(METADATA_FILE).exists());

    let err = FlatIndex::open(store.path(), "fastembed/AllMiniLML6V2").unwrap_err();
    match err {
        StoreError::ModelMismatch { stored, configured } => {
            assert_eq!(stored, MODEL);
            assert_eq!(configured, "fastembed/AllMiniLML6V2");
        }
        other => panic!("expected a model mismatch, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_inserts_keep_every_distinct_id() {
    let store = TempDir::new().unwrap();
    let index = Arc::new(FlatIndex::open(store.path(), MODEL).unwrap());

    let mut tasks = tokio::task::JoinSet::new();
    for writer in 0..8 {
        let index = Arc::clone(&index);
        tasks.spawn(async move {
            for i in 0..25 {
                // Every writer also races for a shared id
                let name = if i == 0 {
                    "shared.jpg".to_string()
                } else {
                    format!("w{writer}-{i}.jpg")
                };
                let _ = index.insert(record(&name, vec![writer as f32, i as f32, 1.0]));
            }
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap();
    }

    // 8 writers x 24 unique ids, plus one winner for the shared id
    assert_eq!(index.len(), 8 * 24 + 1);

    let ranked = index
        .query_nearest(&[1.0, 1.0, 1.0], index.len(), RankingPolicy::Cosine)
        .unwrap();
    let distinct: HashSet<String> = ranked
        .iter()
        .map(|r| r.record.id().to_string())
        .collect();
    assert_eq!(distinct.len(), ranked.len());

    drop(index);
    let reopened = FlatIndex::open(store.path(), MODEL).unwrap();
    assert_eq!(reopened.len(), 8 * 24 + 1);
}
