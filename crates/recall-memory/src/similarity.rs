/// Cosine similarity between two vectors.
///
/// Vectors of different lengths are not comparable and score `0.0`, as does
/// any vector with zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// Weighted linear fusion of a vector score and a keyword score.
///
/// Weights are not normalized. With non-negative weights the result is
/// monotone in both inputs, and stays within `[0, 1]` when both scores are
/// in `[0, 1]` and the weights sum to at most 1.
pub fn fuse(vector_score: f32, keyword_score: f32, vector_weight: f32, keyword_weight: f32) -> f32 {
    vector_score * vector_weight + keyword_score * keyword_weight
}
