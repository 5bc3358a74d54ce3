use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SimilarityError {
    #[error("vector dimensionality mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
}

/// Signed cosine similarity in [-1, 1].
///
/// A zero-norm vector on either side yields 0.0 instead of dividing by
/// zero. Mismatched lengths are a hard error: user and candidate
/// vectors must come from the same embedding family, and coercion
/// would silently corrupt scores.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64, SimilarityError> {
    if a.len() != b.len() {
        return Err(SimilarityError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let norm_a: f64 = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    Ok((dot / (norm_a * norm_b)).clamp(-1.0, 1.0))
}

/// Map a signed score into [0, 1] for display. Internal comparison and
/// persistence keep the signed value; this is presentation only.
pub fn display_score(signed: f64) -> f64 {
    ((signed + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// Scale a vector to unit length in place. A zero vector is left as is.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_score_one() {
        let a = vec![0.5, 0.25, -0.3];
        let sim = cosine_similarity(&a, &a).unwrap();
        assert!((sim - 1.0).abs() < 1e-9);
    }

    #[test]
    fn orthogonal_vectors_score_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert_eq!(cosine_similarity(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn opposite_vectors_score_negative_one() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        let sim = cosine_similarity(&a, &b).unwrap();
        assert!((sim + 1.0).abs() < 1e-9);
    }

    #[test]
    fn zero_norm_side_scores_zero() {
        let a = vec![0.0, 0.0];
        let b = vec![1.0, 2.0];
        assert_eq!(cosine_similarity(&a, &b).unwrap(), 0.0);
        assert_eq!(cosine_similarity(&b, &a).unwrap(), 0.0);
    }

    #[test]
    fn mismatched_lengths_are_a_hard_error() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0];
        assert_eq!(
            cosine_similarity(&a, &b),
            Err(SimilarityError::DimensionMismatch { left: 3, right: 2 })
        );
    }

    #[test]
    fn score_is_invariant_to_uniform_rescaling() {
        let a = vec![0.3, -0.7, 0.2];
        let b = vec![0.1, 0.4, -0.9];
        let scaled: Vec<f32> = a.iter().map(|x| x * 42.0).collect();

        let base = cosine_similarity(&a, &b).unwrap();
        let rescaled = cosine_similarity(&scaled, &b).unwrap();

        assert!((base - rescaled).abs() < 1e-6);
    }

    #[test]
    fn similarity_stays_in_bounds() {
        let a = vec![1e30_f32, 1e30, 1e30];
        let b = vec![1e30_f32, 1e30, 1e30];
        let sim = cosine_similarity(&a, &b).unwrap();
        assert!((-1.0..=1.0).contains(&sim));
    }

    #[test]
    fn display_score_maps_signed_range() {
        assert_eq!(display_score(-1.0), 0.0);
        assert_eq!(display_score(1.0), 1.0);
        assert_eq!(display_score(0.0), 0.5);
    }

    #[test]
    fn l2_normalize_produces_unit_vectors() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }
}
