//! Read access to the published quiz catalog and vector upserts for
//! its choices. Vector writes are overwrite-by-replacement: a
//! regeneration replaces the stored vector and refreshes the
//! generated-at timestamp, with no versioning of old vectors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::PoolError;
use tokio_postgres::Error as PgError;
use tokio_postgres::Row;
use tracing::instrument;

use crate::db::PgPool;
use crate::embed::{BatchItem, EmbedInput, SinkError, VectorSink};
use crate::{AnswerModality, Choice, Question, VectorState, DIMENSION_COUNT};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("postgres error: {0}")]
    Postgres(#[from] PgError),
    #[error("failed to map catalog row: {0}")]
    Mapping(String),
}

fn parse_modality(raw: &str) -> Result<AnswerModality, CatalogError> {
    match raw {
        "text_choice" => Ok(AnswerModality::TextChoice),
        "image_choice" => Ok(AnswerModality::ImageChoice),
        other => Err(CatalogError::Mapping(format!("unknown modality: {other}"))),
    }
}

pub(crate) fn question_from_row(row: &Row) -> Result<Question, CatalogError> {
    let weights: [f32; DIMENSION_COUNT] = [
        row.try_get("weight_style")?,
        row.try_get("weight_communication")?,
        row.try_get("weight_purpose")?,
        row.try_get("weight_companion")?,
    ];

    Ok(Question {
        id: row.try_get("question_id")?,
        position: row.try_get("position")?,
        modality: parse_modality(row.try_get("modality")?)?,
        weights,
    })
}

pub(crate) fn vector_state_from_row(row: &Row) -> Result<VectorState, CatalogError> {
    let vector: Option<Vec<f32>> = row.try_get("vector")?;
    let generated_at: Option<DateTime<Utc>> = row.try_get("vector_generated_at")?;

    match (vector, generated_at) {
        (Some(vector), Some(generated_at)) => Ok(VectorState::Generated {
            vector,
            generated_at,
        }),
        (None, None) => Ok(VectorState::Pending),
        _ => Err(CatalogError::Mapping(
            "vector and vector_generated_at out of sync".into(),
        )),
    }
}

pub(crate) fn choice_from_row(row: &Row) -> Result<Choice, CatalogError> {
    Ok(Choice {
        id: row.try_get("choice_id")?,
        question_id: row.try_get("question_id")?,
        ordinal: row.try_get("ordinal")?,
        label: row.try_get("label")?,
        image_ref: row.try_get("image_ref")?,
        vector: vector_state_from_row(row)?,
    })
}

/// Fetch one choice with its question's modality, for single-item
/// vectorization triggers.
#[instrument(skip(pool))]
pub async fn fetch_choice(pool: &PgPool, choice_id: i64) -> Result<Option<Choice>, CatalogError> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            "SELECT c.id AS choice_id, c.question_id, c.ordinal, c.label, c.image_ref,
                    c.vector, c.vector_generated_at
             FROM pm.choices c
             WHERE c.id = $1",
            &[&choice_id],
        )
        .await?;

    row.as_ref().map(choice_from_row).transpose()
}

/// All published choices still waiting for a vector, oldest first.
#[instrument(skip(pool))]
pub async fn fetch_pending_choice_items(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<BatchItem>, CatalogError> {
    let client = pool.get().await?;
    let rows = client
        .query(
            "SELECT c.id, c.label, c.image_ref, q.modality
             FROM pm.choices c
             JOIN pm.questions q ON q.id = c.question_id
             WHERE c.vector IS NULL AND q.published
             ORDER BY c.id
             LIMIT $1",
            &[&limit],
        )
        .await?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        let id: i64 = row.try_get("id")?;
        let label: Option<String> = row.try_get("label")?;
        let image_ref: Option<String> = row.try_get("image_ref")?;
        let modality = parse_modality(row.try_get("modality")?)?;

        let input = match modality {
            AnswerModality::TextChoice => label.map(EmbedInput::Text),
            AnswerModality::ImageChoice => image_ref.map(EmbedInput::Image),
        };
        let Some(input) = input else {
            return Err(CatalogError::Mapping(format!(
                "choice {id} has no embeddable content for its modality"
            )));
        };
        items.push(BatchItem { id, input });
    }
    Ok(items)
}

/// Overwrite a choice's stored vector and refresh its timestamp.
#[instrument(skip(pool, vector))]
pub async fn upsert_choice_vector(
    pool: &PgPool,
    choice_id: i64,
    vector: &[f32],
) -> Result<u64, CatalogError> {
    let client = pool.get().await?;
    let rows = client
        .execute(
            "UPDATE pm.choices
             SET vector = $2, vector_generated_at = NOW()
             WHERE id = $1",
            &[&choice_id, &vector.to_vec()],
        )
        .await?;
    Ok(rows)
}

/// A `VectorSink` that writes choice vectors; each item's write is its
/// own statement, so completed items survive a later cancellation.
pub struct ChoiceVectorSink {
    pool: PgPool,
}

impl ChoiceVectorSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VectorSink for ChoiceVectorSink {
    async fn store(&self, item_id: i64, vector: &[f32]) -> Result<(), SinkError> {
        let written = upsert_choice_vector(&self.pool, item_id, vector)
            .await
            .map_err(|e| SinkError(e.to_string()))?;
        if written == 0 {
            return Err(SinkError(format!("choice {item_id} does not exist")));
        }
        Ok(())
    }
}
