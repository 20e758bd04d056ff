//! Similarity functions and ranking policies.
//!
//! Two interchangeable policies rank stored vectors against a query:
//! - [`RankingPolicy::Cosine`] always yields the best record, higher is better.
//! - [`RankingPolicy::Threshold`] ranks by Euclidean distance, lower is better,
//!   and drops every record farther than `max_distance`. It can legitimately
//!   return nothing while the index holds records.

use crate::vector::types::VectorError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Default distance cutoff for the threshold policy.
///
/// For unit-length embeddings this is a cosine similarity of 0.68.
pub const DEFAULT_MAX_DISTANCE: f32 = 0.8;

/// Calculate cosine similarity between two vectors.
///
/// Returns `0.0` when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, VectorError> {
    check_lengths(a, b)?;
    Ok(cosine_unchecked(a, b))
}

/// Calculate the Euclidean (L2) distance between two vectors.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Result<f32, VectorError> {
    check_lengths(a, b)?;
    Ok(euclidean_unchecked(a, b))
}

/// Converts a cosine-similarity floor into the equivalent distance cutoff.
///
/// Only exact for unit-length vectors, where `d² = 2 · (1 − cos)`.
#[must_use]
pub fn distance_for_similarity(similarity: f32) -> f32 {
    (2.0 * (1.0 - similarity.clamp(-1.0, 1.0))).sqrt()
}

pub(crate) fn cosine_unchecked(a: &[f32], b: &[f32]) -> f32 {
    // Accumulate in f64: squares of large finite f32 components overflow f32
    let (dot_product, norm_a, norm_b) = a.iter().zip(b.iter()).fold(
        (0.0_f64, 0.0_f64, 0.0_f64),
        |(dot, na, nb), (&x, &y)| {
            let (x, y) = (f64::from(x), f64::from(y));
            (dot + x * y, na + x * x, nb + y * y)
        },
    );

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = dot_product / (norm_a.sqrt() * norm_b.sqrt());
    if !similarity.is_finite() {
        return 0.0;
    }
    // Rounding can push identical vectors a hair past 1.0
    similarity.clamp(-1.0, 1.0) as f32
}

pub(crate) fn euclidean_unchecked(a: &[f32], b: &[f32]) -> f32 {
    let distance = a
        .iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = f64::from(x) - f64::from(y);
            d * d
        })
        .sum::<f64>()
        .sqrt();
    // Saturates to +inf past f32::MAX, which still sorts last
    distance as f32
}
