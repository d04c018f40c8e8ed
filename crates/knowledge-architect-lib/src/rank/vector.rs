/*!
Vector helpers for similarity ranking.

- L2 norm
- Cosine similarity (zero-magnitude safe)
- Element-wise mean of a set of vectors

All helpers take plain slices so records can keep their `Vec<f32>` storage;
`ndarray` views are used for the arithmetic.
*/

use ndarray::{Array2, ArrayView1, Axis};

/// L2 norm of `v`.
pub fn l2_norm(v: &[f32]) -> f32 {
    let view = ArrayView1::from(v);
    view.dot(&view).sqrt()
}

/// Cosine similarity of two equal-length vectors.
///
/// # Returns
///
/// A score in `[-1.0, 1.0]`, or `0.0` when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    cosine_with_norms(a, l2_norm(a), b, l2_norm(b))
}

/// Cosine similarity using precomputed norms.
///
/// # Panics
///
/// Panics if `a` and `b` differ in length; the index guarantees one
/// dimensionality per kind-view.
pub fn cosine_with_norms(a: &[f32], norm_a: f32, b: &[f32], norm_b: f32) -> f32 {
    assert_eq!(a.len(), b.len(), "cosine similarity of mismatched dimensions");
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let dot = ArrayView1::from(a).dot(&ArrayView1::from(b));
    let cosine = dot / (norm_a * norm_b);
    if cosine.is_finite() {
        cosine.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Element-wise arithmetic mean of `vectors` (unweighted).
///
/// # Returns
///
/// `None` when `vectors` is empty or the vectors differ in length.
pub fn mean_vector(vectors: &[&[f32]]) -> Option<Vec<f32>> {
    let dim = vectors.first()?.len();
    if vectors.iter().any(|v| v.len() != dim) {
        return None;
    }
    let mut mat = Array2::<f32>::zeros((vectors.len(), dim));
    for (i, v) in vectors.iter().enumerate() {
        mat.row_mut(i).assign(&ArrayView1::from(*v));
    }
    mat.mean_axis(Axis(0)).map(|m| m.to_vec())
}
