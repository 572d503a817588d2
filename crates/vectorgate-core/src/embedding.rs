//! Pluggable embedding-provider adapter and vector utilities.
//!
//! Concrete provider implementations (OpenAI, Cohere, Perplexity, Ollama,
//! vLLM, Hugging Face, OCI GenAI) live in the `vectorgate-server` app crate;
//! this crate holds only the uniform trait and the pure vector math that
//! every provider's output flows through.

use async_trait::async_trait;
use anyhow::Result;

use crate::models::DistanceMetric;

/// A pluggable embedding backend.
///
/// Implementors live in `vectorgate-server`; this trait is the seam the
/// vector store engine and the testbed runner code against, never a
/// concrete provider type.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model name as reported to callers (recorded in `embeddings.model`).
    fn model_name(&self) -> &str;

    /// Output vector dimensionality.
    fn dims(&self) -> usize;

    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Encode a vector as little-endian f32 bytes for BLOB storage.
///
/// ```
/// use vectorgate_core::embedding::{vec_to_blob, blob_to_vec};
/// let v = vec![1.0f32, -2.5, 0.0];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(v: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(v.len() * 4);
    for x in v {
        out.extend_from_slice(&x.to_le_bytes());
    }
    out
}

/// Decode little-endian f32 bytes back into a vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity between two vectors. Returns `0.0` for empty or
/// mismatched-length inputs, or when either vector has near-zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a < 1e-12 || norm_b < 1e-12 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Euclidean (L2) distance between two vectors.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return f32::INFINITY;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Plain dot product.
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Raw distance between `a` and `b` in the units `metric`'s
/// [`DistanceMetric::similarity`] expects (§4.1.a): cosine distance
/// `1 − cosine_similarity`, dot product pass-through (already a
/// similarity), or plain L2 distance.
pub fn raw_distance(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f64 {
    match metric {
        DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b) as f64,
        DistanceMetric::Dot => dot_product(a, b) as f64,
        DistanceMetric::Euclidean => euclidean_distance(a, b) as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_roundtrip() {
        let v = vec![0.1f32, -2.0, 3.5, 0.0];
        assert_eq!(blob_to_vec(&vec_to_blob(&v)), v);
    }

    #[test]
    fn cosine_identical_is_one() {
        let v = vec![1.0f32, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_is_zero() {
        let a = vec![1.0f32, 0.0];
        let b = vec![0.0f32, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_opposite_is_negative_one() {
        let a = vec![1.0f32, 0.0];
        let b = vec![-1.0f32, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_mismatched_length_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn euclidean_zero_when_identical() {
        let v = vec![1.0f32, 2.0, 3.0];
        assert_eq!(euclidean_distance(&v, &v), 0.0);
    }

    #[test]
    fn raw_distance_matches_metric() {
        let a = vec![1.0f32, 0.0];
        let b = vec![1.0f32, 0.0];
        assert!((raw_distance(DistanceMetric::Cosine, &a, &b) - 0.0).abs() < 1e-6);
        assert!((raw_distance(DistanceMetric::Euclidean, &a, &b) - 0.0).abs() < 1e-6);
        assert!((raw_distance(DistanceMetric::Dot, &a, &b) - 1.0).abs() < 1e-6);
    }
}
