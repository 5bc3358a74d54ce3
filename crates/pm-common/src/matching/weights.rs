use thiserror::Error;

use crate::{Dimension, DIMENSION_COUNT};

/// Default weight set: every dimension counts equally until product
/// tuning says otherwise.
pub const DEFAULT_WEIGHTS: DimensionWeights = DimensionWeights {
    style: 0.25,
    communication: 0.25,
    purpose: 0.25,
    companion: 0.25,
};

#[derive(Debug, Error, PartialEq)]
pub enum WeightsError {
    #[error("weight for {0} is negative: {1}")]
    Negative(&'static str, f64),
    #[error("all dimension weights are zero")]
    ZeroSum,
    #[error("expected {DIMENSION_COUNT} comma separated weights, got {0}")]
    BadShape(usize),
    #[error("failed to parse weight: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DimensionWeights {
    pub style: f64,
    pub communication: f64,
    pub purpose: f64,
    pub companion: f64,
}

impl Default for DimensionWeights {
    fn default() -> Self {
        DEFAULT_WEIGHTS
    }
}

impl DimensionWeights {
    pub fn get(&self, dim: Dimension) -> f64 {
        match dim {
            Dimension::Style => self.style,
            Dimension::Communication => self.communication,
            Dimension::Purpose => self.purpose,
            Dimension::Companion => self.companion,
        }
    }

    pub fn sum(&self) -> f64 {
        self.style + self.communication + self.purpose + self.companion
    }

    /// Renormalize to sum 1, rejecting negative and all-zero configs.
    /// Scoring always goes through this, so stored configurations do
    /// not need to be pre-normalized.
    pub fn normalized(&self) -> Result<[f64; DIMENSION_COUNT], WeightsError> {
        for dim in Dimension::ALL {
            let w = self.get(dim);
            if w < 0.0 {
                return Err(WeightsError::Negative(dim.as_str(), w));
            }
        }

        let total = self.sum();
        if total == 0.0 {
            return Err(WeightsError::ZeroSum);
        }

        let mut out = [0.0; DIMENSION_COUNT];
        for dim in Dimension::ALL {
            out[dim.index()] = self.get(dim) / total;
        }
        Ok(out)
    }

    /// Parse a `style,communication,purpose,companion` list, as carried
    /// by `PM_DIMENSION_WEIGHTS`.
    pub fn parse_list(value: &str) -> Result<DimensionWeights, WeightsError> {
        let parts: Vec<f64> = value
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|e| WeightsError::Parse(e.to_string()))?;

        if parts.len() != DIMENSION_COUNT {
            return Err(WeightsError::BadShape(parts.len()));
        }

        Ok(DimensionWeights {
            style: parts[0],
            communication: parts[1],
            purpose: parts[2],
            companion: parts[3],
        })
    }

    pub fn from_env() -> DimensionWeights {
        match std::env::var("PM_DIMENSION_WEIGHTS") {
            Ok(raw) => match DimensionWeights::parse_list(&raw) {
                Ok(weights) => weights,
                Err(err) => {
                    tracing::warn!(error = %err, "invalid PM_DIMENSION_WEIGHTS; using defaults");
                    DEFAULT_WEIGHTS
                }
            },
            Err(_) => DEFAULT_WEIGHTS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_sum_to_one() {
        assert!((DEFAULT_WEIGHTS.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn normalized_rescales_to_unit_sum() {
        let weights = DimensionWeights {
            style: 2.0,
            communication: 1.0,
            purpose: 1.0,
            companion: 0.0,
        };

        let normalized = weights.normalized().unwrap();

        assert!((normalized.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((normalized[0] - 0.5).abs() < 1e-12);
        assert_eq!(normalized[3], 0.0);
    }

    #[test]
    fn negative_weight_is_rejected() {
        let weights = DimensionWeights {
            style: -0.1,
            ..DEFAULT_WEIGHTS
        };
        assert_eq!(
            weights.normalized(),
            Err(WeightsError::Negative("style", -0.1))
        );
    }

    #[test]
    fn zero_sum_is_rejected() {
        let weights = DimensionWeights {
            style: 0.0,
            communication: 0.0,
            purpose: 0.0,
            companion: 0.0,
        };
        assert_eq!(weights.normalized(), Err(WeightsError::ZeroSum));
    }

    #[test]
    fn parse_list_round_trips() {
        let parsed = DimensionWeights::parse_list("0.4, 0.3, 0.2, 0.1").unwrap();
        assert!((parsed.style - 0.4).abs() < 1e-12);
        assert!((parsed.companion - 0.1).abs() < 1e-12);

        assert!(matches!(
            DimensionWeights::parse_list("0.5,0.5"),
            Err(WeightsError::BadShape(2))
        ));
        assert!(matches!(
            DimensionWeights::parse_list("a,b,c,d"),
            Err(WeightsError::Parse(_))
        ));
    }
}
