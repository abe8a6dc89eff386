//! Vector similarity functions.

use ndarray::ArrayView1;

/// Cosine similarity of two vectors.
///
/// `0.0` for empty or mismatched inputs and for zero vectors, so vectors
/// from a differently-sized provider never score as a match.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (a, b) = (ArrayView1::from(a), ArrayView1::from(b));
    let denom = a.dot(&a).sqrt() * b.dot(&b).sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    a.dot(&b) / denom
}

/// L2-normalised copy of `v`. Zero vectors are returned unchanged.
pub fn normalize_l2(v: &[f32]) -> Vec<f32> {
    let norm = ArrayView1::from(v).dot(&ArrayView1::from(v)).sqrt();
    if norm == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}
