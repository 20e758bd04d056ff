//! Retrieval behaviour of the flat index through the public trait.

use crate::common::{id, record};
use photofind::vector::{
    DEFAULT_MAX_DISTANCE, FlatIndex, InsertError, QueryError, RankingPolicy, VectorIndex,
};

const THRESHOLD: RankingPolicy = RankingPolicy::Threshold {
    max_distance: DEFAULT_MAX_DISTANCE,
};

fn ids(ranked: &[photofind::vector::Ranked]) -> Vec<&str> {
    ranked.iter().map(|r| r.record.id().as_str()).collect()
}

#[test]
fn test_worked_example_top_one_and_two() {
    let index = FlatIndex::new();
    index.insert(record("A", vec![1.0, 0.0])).unwrap();
    index.insert(record("B", vec![0.0, 1.0])).unwrap();
    index.insert(record("C", vec![0.9, 0.1])).unwrap();

    let top1 = index
        .query_nearest(&[1.0, 0.0], 1, RankingPolicy::Cosine)
        .unwrap();
    assert_eq!(ids(&top1), vec!["A"]);
    assert!((top1[0].score - 1.0).abs() < 1e-6);

    let top2 = index
        .query_nearest(&[1.0, 0.0], 2, RankingPolicy::Cosine)
        .unwrap();
    assert_eq!(ids(&top2), vec!["A", "C"]);
    assert!(top2[0].score >= top2[1].score);
}

#[test]
fn test_self_retrieval_among_many_records() {
    let index = FlatIndex::new();
    let dimension = 16;

    // Distinct directions: each record leans on its own axis
    for i in 0..200 {
        let mut vector = vec![0.05_f32; dimension];
        vector[i % dimension] = 1.0 + (i / dimension) as f32;
        vector[(i * 7 + 3) % dimension] += 0.5 * (i % 5) as f32;
        index.insert(record(&format!("img-{i}.jpg"), vector)).unwrap();
    }

    let mut probe = vec![0.05_f32; dimension];
    probe[2] = 42.0;
    probe[11] = -3.0;
    index.insert(record("probe.jpg", probe.clone())).unwrap();

    let cosine = index
        .query_nearest(&probe, 1, RankingPolicy::Cosine)
        .unwrap();
    assert_eq!(ids(&cosine), vec!["probe.jpg"]);
    assert!((cosine[0].score - 1.0).abs() < 1e-5);

    let threshold = index.query_nearest(&probe, 1, THRESHOLD).unwrap();
    assert_eq!(ids(&threshold), vec!["probe.jpg"]);
    assert!(threshold[0].score.abs() < 1e-5);
}

#[test]
fn test_results_are_ordered_best_first() {
    let index = FlatIndex::new();
    index.insert(record("far", vec![0.0, 1.0, 0.0])).unwrap();
    index.insert(record("near", vec![1.0, 0.1, 0.0])).unwrap();
    index.insert(record("mid", vec![1.0, 1.0, 0.0])).unwrap();

    let ranked = index
        .query_nearest(&[1.0, 0.0, 0.0], 3, RankingPolicy::Cosine)
        .unwrap();
    assert_eq!(ids(&ranked), vec!["near", "mid", "far"]);
    assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
}

#[test]
fn test_k_larger_than_index_returns_everything() {
    let index = FlatIndex::new();
    index.insert(record("a", vec![1.0, 0.0])).unwrap();
    index.insert(record("b", vec![0.0, 1.0])).unwrap();

    let ranked = index
        .query_nearest(&[1.0, 1.0], 10, RankingPolicy::Cosine)
        .unwrap();
    assert_eq!(ranked.len(), 2);
}

#[test]
fn test_ties_keep_insertion_order() {
    let index = FlatIndex::new();
    for name in ["first", "second", "third"] {
        index.insert(record(name, vec![0.5, 0.5])).unwrap();
    }

    let cosine = index
        .query_nearest(&[1.0, 1.0], 3, RankingPolicy::Cosine)
        .unwrap();
    assert_eq!(ids(&cosine), vec!["first", "second", "third"]);

    let threshold = index
        .query_nearest(&[0.5, 0.5], 2, THRESHOLD)
        .unwrap();
    assert_eq!(ids(&threshold), vec!["first", "second"]);
}

#[test]
fn test_duplicate_id_leaves_index_unchanged() {
    let index = FlatIndex::new();
    index.insert(record("beach.jpg", vec![1.0, 0.0])).unwrap();

    let err = index
        .insert(record("beach.jpg", vec![0.0, 1.0]))
        .unwrap_err();
    assert!(matches!(err, InsertError::DuplicateId { ref id } if id.as_str() == "beach.jpg"));
    assert_eq!(index.len(), 1);

    // The original vector is still the one retrieved
    let ranked = index
        .query_nearest(&[1.0, 0.0], 1, RankingPolicy::Cosine)
        .unwrap();
    assert!((ranked[0].score - 1.0).abs() < 1e-6);
}

#[test]
fn test_dimension_mismatch_leaves_index_unchanged() {
    let index = FlatIndex::new();
    index.insert(record("a", vec![1.0, 0.0, 0.0])).unwrap();

    let err = index.insert(record("b", vec![1.0, 0.0])).unwrap_err();
    assert!(matches!(
        err,
        InsertError::DimensionMismatch {
            expected: 3,
            actual: 2
        }
    ));
    assert_eq!(index.len(), 1);
    assert!(!index.contains(&id("b")));

    let err = index
        .query_nearest(&[1.0, 0.0], 1, RankingPolicy::Cosine)
        .unwrap_err();
    assert_eq!(
        err,
        QueryError::DimensionMismatch {
            expected: 3,
            actual: 2
        }
    );
}

#[test]
fn test_empty_index_per_policy() {
    let index = FlatIndex::new();

    let err = index
        .query_nearest(&[1.0, 0.0], 1, RankingPolicy::Cosine)
        .unwrap_err();
    assert_eq!(err, QueryError::EmptyIndex);

    let ranked = index.query_nearest(&[1.0, 0.0], 1, THRESHOLD).unwrap();
    assert!(ranked.is_empty());
}

#[test]
fn test_threshold_filters_distant_records() {
    let index = FlatIndex::new();
    index.insert(record("a", vec![5.0, 5.0])).unwrap();
    index.insert(record("b", vec![-5.0, 5.0])).unwrap();

    let ranked = index.query_nearest(&[0.0, 0.0], 5, THRESHOLD).unwrap();
    assert!(ranked.is_empty());

    index.insert(record("c", vec![0.3, 0.4])).unwrap();
    let ranked = index.query_nearest(&[0.0, 0.0], 5, THRESHOLD).unwrap();
    assert_eq!(ids(&ranked), vec!["c"]);
    assert!((ranked[0].score - 0.5).abs() < 1e-6);
}

#[test]
fn test_zero_magnitude_vectors_score_zero() {
    let index = FlatIndex::new();
    index.insert(record("zero", vec![0.0, 0.0])).unwrap();
    index.insert(record("unit", vec![1.0, 0.0])).unwrap();

    let ranked = index
        .query_nearest(&[0.0, 0.0], 2, RankingPolicy::Cosine)
        .unwrap();
    assert!(ranked.iter().all(|r| r.score == 0.0));
    // Equal scores fall back to insertion order
    assert_eq!(ids(&ranked), vec!["zero", "unit"]);
}

#[test]
fn test_non_finite_query_is_rejected() {
    let index = FlatIndex::new();
    index.insert(record("a", vec![1.0, 0.0])).unwrap();

    let err = index
        .query_nearest(&[f32::NAN, 0.0], 1, RankingPolicy::Cosine)
        .unwrap_err();
    assert!(matches!(err, QueryError::InvalidVector { position: 0, .. }));
}
