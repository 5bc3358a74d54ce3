use std::collections::BTreeMap;

use async_trait::async_trait;
use deadpool_postgres::PoolError;
use tokio_postgres::Error as PgError;
use tracing::{instrument, warn};

use crate::db::PgPool;
use crate::embed::{BatchItem, EmbedInput, SinkError, VectorSink};
use crate::{Dimension, EligibleCandidate, DIMENSION_COUNT};

#[derive(Debug, thiserror::Error)]
pub enum CandidateFetchError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("postgres error: {0}")]
    Postgres(#[from] PgError),
    #[error("failed to map candidate row: {0}")]
    Mapping(String),
}

fn dimension_from_str(raw: &str) -> Option<Dimension> {
    Dimension::ALL.into_iter().find(|d| d.as_str() == raw)
}

/// Fetch every scoring-eligible candidate, ordered by id so downstream
/// tie-breaks follow creation order.
///
/// A profile whose completeness flag disagrees with its stored vectors
/// is excluded with a warning rather than failing the whole fetch;
/// incompleteness is never a fatal request error.
#[instrument(skip(pool))]
pub async fn fetch_eligible_candidates(
    pool: &PgPool,
) -> Result<Vec<EligibleCandidate>, CandidateFetchError> {
    let client = pool.get().await?;
    let rows = client
        .query(
            "SELECT d.candidate_id, d.dimension, d.vector
             FROM pm.candidate_dimensions d
             JOIN pm.candidate_profiles p ON p.id = d.candidate_id
             WHERE p.profile_complete
             ORDER BY d.candidate_id, d.dimension",
            &[],
        )
        .await?;

    let mut grouped: BTreeMap<i64, [Option<Vec<f32>>; DIMENSION_COUNT]> = BTreeMap::new();
    for row in rows {
        let candidate_id: i64 = row.try_get("candidate_id")?;
        let dimension: String = row.try_get("dimension")?;
        let vector: Option<Vec<f32>> = row.try_get("vector")?;

        let Some(dimension) = dimension_from_str(&dimension) else {
            return Err(CandidateFetchError::Mapping(format!(
                "unknown dimension: {dimension}"
            )));
        };
        grouped.entry(candidate_id).or_default()[dimension.index()] = vector;
    }

    let mut eligible = Vec::with_capacity(grouped.len());
    for (candidate_id, slots) in grouped {
        let mut vectors: [Vec<f32>; DIMENSION_COUNT] = Default::default();
        let mut complete = true;
        for (target, slot) in vectors.iter_mut().zip(slots.into_iter()) {
            match slot {
                Some(vector) => *target = vector,
                None => {
                    complete = false;
                    break;
                }
            }
        }

        if !complete {
            warn!(
                candidate_id,
                "profile flagged complete but missing a dimension vector; excluded from scoring"
            );
            continue;
        }
        eligible.push(EligibleCandidate {
            id: candidate_id,
            vectors,
        });
    }

    Ok(eligible)
}

/// Candidate dimension descriptions still waiting for a vector.
#[instrument(skip(pool))]
pub async fn fetch_pending_candidate_items(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<BatchItem>, CandidateFetchError> {
    let client = pool.get().await?;
    let rows = client
        .query(
            "SELECT id, description
             FROM pm.candidate_dimensions
             WHERE vector IS NULL
             ORDER BY id
             LIMIT $1",
            &[&limit],
        )
        .await?;

    rows.iter()
        .map(|row| {
            Ok(BatchItem {
                id: row.try_get("id")?,
                input: EmbedInput::Text(row.try_get("description")?),
            })
        })
        .collect()
}

/// Overwrite one candidate dimension's vector and recompute the
/// owning profile's completeness flag in the same transaction.
#[instrument(skip(pool, vector))]
pub async fn upsert_candidate_dimension_vector(
    pool: &PgPool,
    dimension_row_id: i64,
    vector: &[f32],
) -> Result<u64, CandidateFetchError> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let updated = tx
        .query_opt(
            "UPDATE pm.candidate_dimensions
             SET vector = $2, vector_generated_at = NOW()
             WHERE id = $1
             RETURNING candidate_id",
            &[&dimension_row_id, &vector.to_vec()],
        )
        .await?;

    let Some(row) = updated else {
        tx.rollback().await?;
        return Ok(0);
    };
    let candidate_id: i64 = row.try_get("candidate_id")?;

    tx.execute(
        "UPDATE pm.candidate_profiles p
         SET profile_complete = (
             SELECT COUNT(*) = $2::BIGINT
             FROM pm.candidate_dimensions d
             WHERE d.candidate_id = p.id AND d.vector IS NOT NULL
         )
         WHERE p.id = $1",
        &[&candidate_id, &(DIMENSION_COUNT as i64)],
    )
    .await?;

    tx.commit().await?;
    Ok(1)
}

pub struct CandidateDimensionSink {
    pool: PgPool,
}

impl CandidateDimensionSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VectorSink for CandidateDimensionSink {
    async fn store(&self, item_id: i64, vector: &[f32]) -> Result<(), SinkError> {
        let written = upsert_candidate_dimension_vector(&self.pool, item_id, vector)
            .await
            .map_err(|e| SinkError(e.to_string()))?;
        if written == 0 {
            return Err(SinkError(format!(
                "candidate dimension {item_id} does not exist"
            )));
        }
        Ok(())
    }
}
