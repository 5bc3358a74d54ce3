use chrono::{DateTime, Utc};
use deadpool_postgres::PoolError;
use tokio_postgres::Error as PgError;
use tracing::instrument;

use crate::db::catalog::{choice_from_row, question_from_row, CatalogError};
use crate::db::PgPool;
use crate::matching::AggregateSet;
use crate::{Dimension, Session, SessionAnswer, SessionState};

#[derive(Debug, thiserror::Error)]
pub enum SessionStorageError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("postgres error: {0}")]
    Postgres(#[from] PgError),
    #[error("failed to map session row: {0}")]
    Mapping(String),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

#[instrument(skip(pool))]
pub async fn fetch_session(
    pool: &PgPool,
    session_id: i64,
) -> Result<Option<Session>, SessionStorageError> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            "SELECT id, state, completed_at FROM pm.sessions WHERE id = $1",
            &[&session_id],
        )
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let state: String = row.try_get("state")?;
    let state = SessionState::parse(&state)
        .ok_or_else(|| SessionStorageError::Mapping(format!("unknown session state: {state}")))?;
    let completed_at: Option<DateTime<Utc>> = row.try_get("completed_at")?;

    Ok(Some(Session {
        id: row.try_get("id")?,
        state,
        completed_at,
    }))
}

/// The session's answered (question, choice) pairs in quiz order, with
/// weights and stored vectors resolved for the aggregator.
#[instrument(skip(pool))]
pub async fn fetch_session_answers(
    pool: &PgPool,
    session_id: i64,
) -> Result<Vec<SessionAnswer>, SessionStorageError> {
    let client = pool.get().await?;
    let rows = client
        .query(
            "SELECT q.id AS question_id, q.position, q.modality,
                    q.weight_style, q.weight_communication,
                    q.weight_purpose, q.weight_companion,
                    c.id AS choice_id, c.ordinal, c.label, c.image_ref,
                    c.vector, c.vector_generated_at
             FROM pm.session_answers a
             JOIN pm.questions q ON q.id = a.question_id
             JOIN pm.choices c ON c.id = a.choice_id
             WHERE a.session_id = $1
             ORDER BY q.position",
            &[&session_id],
        )
        .await?;

    rows.iter()
        .map(|row| {
            Ok(SessionAnswer {
                question: question_from_row(row)?,
                choice: choice_from_row(row)?,
            })
        })
        .collect()
}

/// Persist a session's four aggregate vectors and move an `answering`
/// session to `ready`. Re-running with recomputed aggregates is an
/// overwrite, not an error.
#[instrument(skip(pool, set))]
pub async fn save_aggregates(
    pool: &PgPool,
    session_id: i64,
    set: &AggregateSet,
) -> Result<(), SessionStorageError> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let stmt = tx
        .prepare(
            "INSERT INTO pm.session_aggregates (session_id, dimension, vector, degraded)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (session_id, dimension)
             DO UPDATE SET vector = EXCLUDED.vector,
                           degraded = EXCLUDED.degraded,
                           computed_at = NOW()",
        )
        .await?;

    for dim in Dimension::ALL {
        let idx = dim.index();
        tx.execute(
            &stmt,
            &[
                &session_id,
                &dim.as_str(),
                &set.vectors[idx],
                &set.degraded[idx],
            ],
        )
        .await?;
    }

    tx.execute(
        "UPDATE pm.sessions SET state = 'ready'
         WHERE id = $1 AND state = 'answering'",
        &[&session_id],
    )
    .await?;

    tx.commit().await?;
    Ok(())
}
