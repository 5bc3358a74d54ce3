use std::cmp::Ordering;

use thiserror::Error;

use crate::matching::similarity::{cosine_similarity, SimilarityError};
use crate::matching::weights::{DimensionWeights, WeightsError};
use crate::{Dimension, EligibleCandidate, DIMENSION_COUNT};

/// Default number of ranked candidates kept per session.
pub const DEFAULT_TOP_K: usize = 3;

#[derive(Debug, Error, PartialEq)]
pub enum ScoreError {
    #[error("invalid dimension weights: {0}")]
    Weights(#[from] WeightsError),
    #[error("candidate {candidate_id} on dimension {dimension}: {source}")]
    Similarity {
        candidate_id: i64,
        dimension: &'static str,
        source: SimilarityError,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub candidate_id: i64,
    /// Signed weighted score in [-1, 1].
    pub overall: f64,
    pub subscores: [f64; DIMENSION_COUNT],
}

/// Score every eligible candidate against a session's aggregate
/// profile and return the top `top_k`, ranked.
///
/// Ordering is fully deterministic: descending overall score, then
/// ascending candidate id (creation order). Candidates beyond `top_k`
/// are dropped, not hidden.
pub fn rank_candidates(
    user_vectors: &[Vec<f32>; DIMENSION_COUNT],
    candidates: &[EligibleCandidate],
    weights: &DimensionWeights,
    top_k: usize,
) -> Result<Vec<ScoredCandidate>, ScoreError> {
    let normalized = weights.normalized()?;

    let mut scored = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let mut subscores = [0.0f64; DIMENSION_COUNT];
        let mut overall = 0.0f64;

        for dim in Dimension::ALL {
            let idx = dim.index();
            let sim = cosine_similarity(&user_vectors[idx], &candidate.vectors[idx]).map_err(
                |source| ScoreError::Similarity {
                    candidate_id: candidate.id,
                    dimension: dim.as_str(),
                    source,
                },
            )?;
            subscores[idx] = sim;
            overall += normalized[idx] * sim;
        }

        scored.push(ScoredCandidate {
            candidate_id: candidate.id,
            overall: overall.clamp(-1.0, 1.0),
            subscores,
        });
    }

    scored.sort_by(|a, b| {
        b.overall
            .partial_cmp(&a.overall)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.candidate_id.cmp(&b.candidate_id))
    });
    scored.truncate(top_k);

    Ok(scored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::weights::DEFAULT_WEIGHTS;

    fn unit(dims: [[f32; 2]; 4]) -> [Vec<f32>; 4] {
        [
            dims[0].to_vec(),
            dims[1].to_vec(),
            dims[2].to_vec(),
            dims[3].to_vec(),
        ]
    }

    fn candidate(id: i64, dims: [[f32; 2]; 4]) -> EligibleCandidate {
        EligibleCandidate {
            id,
            vectors: unit(dims),
        }
    }

    const E1: [f32; 2] = [1.0, 0.0];
    const E2: [f32; 2] = [0.0, 1.0];

    #[test]
    fn perfect_match_scores_one_everywhere() {
        let user = unit([E1, E1, E1, E1]);
        let ranked = rank_candidates(
            &user,
            &[candidate(1, [E1, E1, E1, E1])],
            &DEFAULT_WEIGHTS,
            DEFAULT_TOP_K,
        )
        .unwrap();

        assert_eq!(ranked.len(), 1);
        assert!((ranked[0].overall - 1.0).abs() < 1e-9);
        for sub in ranked[0].subscores {
            assert!((sub - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn ranking_is_descending_with_id_tie_break() {
        let user = unit([E1, E1, E1, E1]);
        // B and C are identical profiles (both orthogonal on two
        // dimensions), A matches fully.
        let candidates = vec![
            candidate(30, [E1, E2, E1, E2]),
            candidate(10, [E1, E1, E1, E1]),
            candidate(20, [E1, E2, E1, E2]),
        ];

        for _ in 0..5 {
            let ranked =
                rank_candidates(&user, &candidates, &DEFAULT_WEIGHTS, DEFAULT_TOP_K).unwrap();
            let ids: Vec<i64> = ranked.iter().map(|r| r.candidate_id).collect();
            assert_eq!(ids, vec![10, 20, 30]);
        }
    }

    #[test]
    fn top_k_discards_the_tail() {
        let user = unit([E1, E1, E1, E1]);
        let candidates: Vec<_> = (1..=10)
            .map(|id| candidate(id, [E1, E1, E1, E1]))
            .collect();

        let ranked = rank_candidates(&user, &candidates, &DEFAULT_WEIGHTS, 3).unwrap();

        assert_eq!(ranked.len(), 3);
        assert_eq!(
            ranked.iter().map(|r| r.candidate_id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn weights_shift_the_winner() {
        let user = unit([E1, E2, E1, E1]);
        // 40 wins on style only, 41 wins on communication only.
        let candidates = vec![
            candidate(40, [E1, E1, E2, E2]),
            candidate(41, [E2, E2, E2, E2]),
        ];

        let style_heavy = DimensionWeights {
            style: 1.0,
            communication: 0.0,
            purpose: 0.0,
            companion: 0.0,
        };
        let ranked = rank_candidates(&user, &candidates, &style_heavy, 2).unwrap();
        assert_eq!(ranked[0].candidate_id, 40);

        let comms_heavy = DimensionWeights {
            style: 0.0,
            communication: 1.0,
            purpose: 0.0,
            companion: 0.0,
        };
        let ranked = rank_candidates(&user, &candidates, &comms_heavy, 2).unwrap();
        assert_eq!(ranked[0].candidate_id, 41);
    }

    #[test]
    fn dimension_mismatch_is_a_hard_error() {
        let user = unit([E1, E1, E1, E1]);
        let mut bad = candidate(5, [E1, E1, E1, E1]);
        bad.vectors[2] = vec![1.0, 0.0, 0.0];

        let err = rank_candidates(&user, &[bad], &DEFAULT_WEIGHTS, 3).unwrap_err();
        assert!(matches!(
            err,
            ScoreError::Similarity {
                candidate_id: 5,
                dimension: "purpose",
                ..
            }
        ));
    }

    #[test]
    fn zero_weight_dimension_does_not_move_the_score() {
        let user = unit([E1, E1, E1, E1]);
        // Differs from the user only on companion.
        let candidates = vec![candidate(1, [E1, E1, E1, E2])];

        let weights = DimensionWeights {
            companion: 0.0,
            ..DEFAULT_WEIGHTS
        };
        let ranked = rank_candidates(&user, &candidates, &weights, 1).unwrap();

        assert!((ranked[0].overall - 1.0).abs() < 1e-9);
        assert_eq!(ranked[0].subscores[3], 0.0);
    }
}
