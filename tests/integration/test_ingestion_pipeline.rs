//! End-to-end ingestion and querying with deterministic collaborators.

use crate::common::{FileCaptioner, KeywordEmbedder, TestAlbum, UnreachableEmbedder, id};
use photofind::pipeline::{
    IngestError, IngestOptions, IngestionPipeline, QueryEngine, QueryOutcome, SearchError,
    expand_sources,
};
use photofind::providers::CollaboratorError;
use photofind::vector::{
    DEFAULT_MAX_DISTANCE, FlatIndex, InsertError, RankingPolicy, VectorIndex,
};
use std::sync::Arc;
use std::sync::atomic::Ordering;

fn pipeline(index: &Arc<FlatIndex>, captioner: &Arc<FileCaptioner>) -> IngestionPipeline {
    IngestionPipeline::new(
        Arc::clone(index) as Arc<dyn VectorIndex>,
        Arc::clone(captioner) as _,
        Arc::new(KeywordEmbedder::default()),
        IngestOptions {
            concurrency: 2,
            ..IngestOptions::default()
        },
    )
}

#[tokio::test]
async fn test_failed_caption_is_isolated() {
    let album = TestAlbum::new();
    let files = vec![
        album.add_image("one.jpg", "a dog running on the beach"),
        album.add_image("two.jpg", "corrupt bytes"),
        album.add_image("three.jpg", "a red car at sunset"),
    ];

    let index = Arc::new(FlatIndex::new());
    let captioner = Arc::new(FileCaptioner::default());
    let report = pipeline(&index, &captioner).ingest(files.clone()).await;

    assert_eq!(index.len(), 2);
    assert_eq!(report.stored, vec![id("one.jpg"), id("three.jpg")]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].source, files[1]);
    assert!(matches!(
        report.skipped[0].error,
        IngestError::DescriptionFailed(CollaboratorError::Api { status: 400, .. })
    ));
    assert_eq!(report.total(), 3);
}

#[tokio::test]
async fn test_missing_and_unsupported_sources_are_reported() {
    let album = TestAlbum::new();
    let good = album.add_image("cat.png", "a cat sleeping");
    let notes = album.add_image("notes.txt", "not an image");
    let missing = album.path().join("missing.jpg");

    let index = Arc::new(FlatIndex::new());
    let captioner = Arc::new(FileCaptioner::default());
    let report = pipeline(&index, &captioner)
        .ingest(vec![missing.clone(), good, notes])
        .await;

    assert_eq!(report.stored, vec![id("cat.png")]);
    assert_eq!(report.skipped.len(), 2);
    assert_eq!(report.skipped[0].source, missing);
    assert!(
        report
            .skipped
            .iter()
            .all(|item| item.error.kind() == "source_unavailable")
    );
    // Only the readable image reached the captioner
    assert_eq!(captioner.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_duplicate_file_names_skip_without_remote_calls() {
    let album = TestAlbum::new();
    let first = album.add_image("2023/beach.jpg", "a dog on the beach");
    let second = album.add_image("2024/beach.jpg", "a cat on the beach");

    let index = Arc::new(FlatIndex::new());
    let captioner = Arc::new(FileCaptioner::default());
    let pipeline = pipeline(&index, &captioner);

    pipeline.ingest(vec![first]).await;
    let report = pipeline.ingest(vec![second]).await;

    assert!(report.stored.is_empty());
    assert!(matches!(
        report.skipped[0].error,
        IngestError::Insert(InsertError::DuplicateId { .. })
    ));
    assert_eq!(index.len(), 1);
    assert_eq!(captioner.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_ingest_directory_then_query() {
    let album = TestAlbum::new();
    album.add_image("dog.jpg", "A golden dog fetching a stick");
    album.add_image("sunset.png", "Orange sunset over a calm beach");
    album.add_image("garage/car.webp", "A vintage car parked in a garage");
    album.add_image("readme.md", "ignored");

    let files = expand_sources(&[album.path().to_path_buf()]);
    assert_eq!(files.len(), 3);

    let index = Arc::new(FlatIndex::new());
    let captioner = Arc::new(FileCaptioner::default());
    let report = pipeline(&index, &captioner).ingest(files).await;
    assert_eq!(report.stored.len(), 3);
    assert!(report.skipped.is_empty());

    let engine = QueryEngine::new(
        index.clone(),
        Arc::new(KeywordEmbedder::default()),
        RankingPolicy::Cosine,
    );
    let outcome = engine.search("a photo of a car").await.unwrap();
    let QueryOutcome::Found(matches) = outcome else {
        panic!("expected a match, got {outcome:?}");
    };
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].id, "car.webp");
    assert_eq!(matches[0].description, "A vintage car parked in a garage");
    assert!(matches[0].source.ends_with("car.webp"));

    let outcome = engine.with_top_k(2).search("sunset at the beach").await.unwrap();
    let QueryOutcome::Found(matches) = outcome else {
        panic!("expected matches, got {outcome:?}");
    };
    assert_eq!(matches[0].id, "sunset.png");
    assert_eq!(matches.len(), 2);
}

#[tokio::test]
async fn test_query_outcomes_without_results() {
    let index = Arc::new(FlatIndex::new());
    let threshold = RankingPolicy::Threshold {
        max_distance: DEFAULT_MAX_DISTANCE,
    };

    let engine = QueryEngine::new(
        index.clone(),
        Arc::new(KeywordEmbedder::default()),
        threshold,
    );
    assert_eq!(
        engine.search("a dog").await.unwrap(),
        QueryOutcome::EmptyIndex
    );

    let album = TestAlbum::new();
    let captioner = Arc::new(FileCaptioner::default());
    pipeline(&index, &captioner)
        .ingest(vec![album.add_image("cat.jpg", "cat cat cat cat")])
        .await;

    assert_eq!(
        engine.search("dog dog dog").await.unwrap(),
        QueryOutcome::NoMatch
    );
}

#[tokio::test]
async fn test_query_errors_are_reported() {
    let index = Arc::new(FlatIndex::new());
    let album = TestAlbum::new();
    let captioner = Arc::new(FileCaptioner::default());
    pipeline(&index, &captioner)
        .ingest(vec![album.add_image("dog.jpg", "dog")])
        .await;

    let embedder = Arc::new(KeywordEmbedder::default());
    let engine = QueryEngine::new(index.clone(), embedder.clone(), RankingPolicy::Cosine);
    assert_eq!(engine.search("   ").await, Err(SearchError::EmptyQuery));
    // Blank queries never reach the embedder
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);

    let engine = QueryEngine::new(index, Arc::new(UnreachableEmbedder), RankingPolicy::Cosine);
    assert!(matches!(
        engine.search("dog").await,
        Err(SearchError::EmbeddingFailed(CollaboratorError::Transport(_)))
    ));
}
