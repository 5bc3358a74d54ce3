use thiserror::Error;
use tracing::debug;

use crate::matching::similarity::l2_normalize;
use crate::{Dimension, SessionAnswer, DIMENSION_COUNT};

#[derive(Debug, Error, PartialEq)]
pub enum AggregateError {
    #[error("no usable answer vector for dimension {0}; session cannot be finalized")]
    EmptyDimension(&'static str),
    #[error("answer vectors disagree on dimensionality: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
}

/// A session's per-dimension aggregate profile.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateSet {
    /// Unit-length aggregate per dimension, indexed by `Dimension::index`.
    pub vectors: [Vec<f32>; DIMENSION_COUNT],
    /// True where at least one weighted answer was skipped for lack of
    /// a generated vector. The aggregate is still usable.
    pub degraded: [bool; DIMENSION_COUNT],
    /// Choice ids skipped because their vector is still pending.
    pub skipped_choice_ids: Vec<i64>,
}

impl AggregateSet {
    pub fn is_degraded(&self) -> bool {
        self.degraded.iter().any(|d| *d)
    }
}

/// Combine a session's answered choices into one normalized vector per
/// dimension.
///
/// For each dimension the weighted mean of every answered choice with
/// a non-zero weight and a generated vector is taken and L2-normalized.
/// Answers whose vector has not been generated yet are skipped and
/// recorded, degrading the dimensions they would have fed. A dimension
/// with no usable contribution at all blocks finalization.
///
/// Pure over its inputs: the same answers and vector store state yield
/// a bit-identical result.
pub fn aggregate_session(answers: &[SessionAnswer]) -> Result<AggregateSet, AggregateError> {
    let mut sums: [Vec<f64>; DIMENSION_COUNT] = Default::default();
    let mut denominators = [0.0f64; DIMENSION_COUNT];
    let mut degraded = [false; DIMENSION_COUNT];
    let mut skipped_choice_ids = Vec::new();

    for answer in answers {
        let weights = &answer.question.weights;
        let vector = answer.choice.vector.vector();

        if vector.is_none() && weights.iter().any(|w| *w > 0.0) {
            skipped_choice_ids.push(answer.choice.id);
        }

        for dim in Dimension::ALL {
            let weight = f64::from(weights[dim.index()]);
            if weight <= 0.0 {
                continue;
            }

            let Some(vector) = vector else {
                degraded[dim.index()] = true;
                continue;
            };

            let acc = &mut sums[dim.index()];
            if acc.is_empty() {
                acc.resize(vector.len(), 0.0);
            } else if acc.len() != vector.len() {
                return Err(AggregateError::DimensionMismatch {
                    left: acc.len(),
                    right: vector.len(),
                });
            }

            for (slot, value) in acc.iter_mut().zip(vector.iter()) {
                *slot += weight * f64::from(*value);
            }
            denominators[dim.index()] += weight;
        }
    }

    let mut vectors: [Vec<f32>; DIMENSION_COUNT] = Default::default();
    for dim in Dimension::ALL {
        let idx = dim.index();
        if denominators[idx] == 0.0 {
            return Err(AggregateError::EmptyDimension(dim.as_str()));
        }

        let mut mean: Vec<f32> = sums[idx]
            .iter()
            .map(|v| (v / denominators[idx]) as f32)
            .collect();
        l2_normalize(&mut mean);
        vectors[idx] = mean;
    }

    if !skipped_choice_ids.is_empty() {
        debug!(
            skipped = skipped_choice_ids.len(),
            "aggregated session with pending-vector answers skipped"
        );
    }

    Ok(AggregateSet {
        vectors,
        degraded,
        skipped_choice_ids,
    })
}
