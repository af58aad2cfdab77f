/// Cosine similarity of two vectors. Zero-length or zero-norm inputs and
/// mismatched dimensions give `NaN`, which never wins a comparison.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return f32::NAN;
    }

    let (dot, norm_a, norm_b) = a.iter().zip(b).fold((0.0f32, 0.0f32, 0.0f32), |acc, (x, y)| {
        (acc.0 + x * y, acc.1 + x * x, acc.2 + y * y)
    });

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Index and score of the first maximal element. `NaN` scores are skipped;
/// `None` when no score is comparable.
pub fn first_argmax(scores: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, current)) if score <= current => {}
            _ => best = Some((idx, score)),
        }
    }
    best
}
