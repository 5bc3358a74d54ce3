pub mod aggregate;
pub mod pipeline;
pub mod scorer;
pub mod similarity;
pub mod weights;

pub use aggregate::{aggregate_session, AggregateError, AggregateSet};
pub use pipeline::{ComputeOptions, MatchEngine, PipelineError};
pub use scorer::{rank_candidates, ScoreError, ScoredCandidate};
pub use similarity::{cosine_similarity, display_score, SimilarityError};
pub use weights::{DimensionWeights, WeightsError, DEFAULT_WEIGHTS};
