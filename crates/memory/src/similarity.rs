//! Similarity measures for semantic recall.
//!
//! Cosine similarity over embedding vectors, with token-overlap (Jaccard)
//! as the fallback when a fact or query has no embedding.

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal.
/// Returns 0.0 if either vector is zero-length, empty, or the lengths
/// mismatch.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Jaccard overlap of the two texts' lowercase token sets, in [0, 1].
pub fn token_overlap(a: &str, b: &str) -> f32 {
    let set_a: std::collections::HashSet<String> =
        a.to_lowercase().split_whitespace().map(str::to_string).collect();
    let set_b: std::collections::HashSet<String> =
        b.to_lowercase().split_whitespace().map(str::to_string).collect();

    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f32 / union.max(1) as f32
}
