//! Persistence of a session's ranked result set.
//!
//! The whole set is replaced in one transaction, gated on the session's
//! `ready -> scored` transition. Two concurrent finalizers both reach
//! the guard, one wins, and the loser observes zero updated rows and
//! backs off with `ReplaceOutcome::Lost` so the caller can re-read the
//! canonical rows instead of erroring.

use chrono::{DateTime, Utc};
use deadpool_postgres::PoolError;
use tokio_postgres::error::SqlState;
use tokio_postgres::Error as PgError;
use tracing::{info, instrument};

use crate::db::PgPool;
use crate::MatchRow;

#[derive(Debug, thiserror::Error)]
pub enum ResultStorageError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("postgres error: {0}")]
    Postgres(#[from] PgError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// This caller's rows are now the persisted set.
    Written,
    /// Another writer finalized first (or the session is not in the
    /// expected state); nothing was written.
    Lost,
}

fn row_from_db(row: &tokio_postgres::Row) -> Result<MatchRow, PgError> {
    let created_at: Option<DateTime<Utc>> = row.try_get("created_at")?;
    Ok(MatchRow {
        session_id: row.try_get("session_id")?,
        candidate_id: row.try_get("candidate_id")?,
        rank: row.try_get("rank")?,
        overall: row.try_get("overall")?,
        subscores: [
            row.try_get("score_style")?,
            row.try_get("score_communication")?,
            row.try_get("score_purpose")?,
            row.try_get("score_companion")?,
        ],
        run_id: row.try_get("run_id")?,
        created_at,
    })
}

/// Read a session's persisted result set in rank order.
#[instrument(skip(pool))]
pub async fn fetch_match_rows(
    pool: &PgPool,
    session_id: i64,
) -> Result<Vec<MatchRow>, ResultStorageError> {
    let client = pool.get().await?;
    let rows = client
        .query(
            "SELECT session_id, candidate_id, rank, overall,
                    score_style, score_communication, score_purpose, score_companion,
                    run_id, created_at
             FROM pm.match_results
             WHERE session_id = $1
             ORDER BY rank",
            &[&session_id],
        )
        .await?;

    rows.iter()
        .map(|row| row_from_db(row).map_err(ResultStorageError::from))
        .collect()
}

async fn insert_rows(
    tx: &tokio_postgres::Transaction<'_>,
    session_id: i64,
    rows: &[MatchRow],
) -> Result<(), PgError> {
    let stmt = tx
        .prepare(
            "INSERT INTO pm.match_results (
                session_id, candidate_id, rank, overall,
                score_style, score_communication, score_purpose, score_companion,
                run_id
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .await?;

    for row in rows {
        tx.execute(
            &stmt,
            &[
                &session_id,
                &row.candidate_id,
                &row.rank,
                &row.overall,
                &row.subscores[0],
                &row.subscores[1],
                &row.subscores[2],
                &row.subscores[3],
                &row.run_id,
            ],
        )
        .await?;
    }
    Ok(())
}

fn is_unique_violation(err: &PgError) -> bool {
    err.code() == Some(&SqlState::UNIQUE_VIOLATION)
}

/// Atomically persist a ranked set and mark the session `scored`.
///
/// Either every row lands and the session advances, or nothing is
/// written at all. Single-writer-wins: the `ready -> scored` guard
/// admits exactly one finalizer per session.
#[instrument(skip(pool, rows))]
pub async fn replace_results(
    pool: &PgPool,
    session_id: i64,
    rows: &[MatchRow],
) -> Result<ReplaceOutcome, ResultStorageError> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let advanced = tx
        .execute(
            "UPDATE pm.sessions
             SET state = 'scored', completed_at = NOW()
             WHERE id = $1 AND state = 'ready'",
            &[&session_id],
        )
        .await?;

    if advanced == 0 {
        tx.rollback().await?;
        return Ok(ReplaceOutcome::Lost);
    }

    tx.execute(
        "DELETE FROM pm.match_results WHERE session_id = $1",
        &[&session_id],
    )
    .await?;

    if let Err(err) = insert_rows(&tx, session_id, rows).await {
        if is_unique_violation(&err) {
            return Ok(ReplaceOutcome::Lost);
        }
        return Err(err.into());
    }

    match tx.commit().await {
        Ok(()) => {
            info!(session_id, rows = rows.len(), "persisted ranked result set");
            Ok(ReplaceOutcome::Written)
        }
        Err(err) if is_unique_violation(&err) => Ok(ReplaceOutcome::Lost),
        Err(err) => Err(err.into()),
    }
}

/// Administrative recompute: replace the rows of an already `scored`
/// session. Returns `Lost` when the session is not `scored`.
#[instrument(skip(pool, rows))]
pub async fn replace_results_forced(
    pool: &PgPool,
    session_id: i64,
    rows: &[MatchRow],
) -> Result<ReplaceOutcome, ResultStorageError> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let touched = tx
        .execute(
            "UPDATE pm.sessions SET completed_at = NOW()
             WHERE id = $1 AND state = 'scored'",
            &[&session_id],
        )
        .await?;

    if touched == 0 {
        tx.rollback().await?;
        return Ok(ReplaceOutcome::Lost);
    }

    tx.execute(
        "DELETE FROM pm.match_results WHERE session_id = $1",
        &[&session_id],
    )
    .await?;
    insert_rows(&tx, session_id, rows).await?;
    tx.commit().await?;

    info!(
        session_id,
        rows = rows.len(),
        "force-recomputed ranked result set"
    );
    Ok(ReplaceOutcome::Written)
}
