use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use pm_common::db::{fetch_match_rows, fetch_session};
use pm_common::matching::{display_score, ComputeOptions};
use pm_common::{MatchRow, SessionState};

use crate::error::ApiError;
use crate::SharedState;

#[derive(Debug, Serialize)]
pub struct DimensionScores {
    pub style: f64,
    pub communication: f64,
    pub purpose: f64,
    pub companion: f64,
}

#[derive(Debug, Serialize)]
pub struct MatchResponse {
    pub candidate_id: i64,
    pub rank: i32,
    /// Display score mapped into [0, 1].
    pub score: f64,
    /// Signed weighted score in [-1, 1], the value rankings use.
    pub raw_score: f64,
    pub subscores: DimensionScores,
    pub run_id: Option<String>,
}

impl From<&MatchRow> for MatchResponse {
    fn from(row: &MatchRow) -> Self {
        Self {
            candidate_id: row.candidate_id,
            rank: row.rank,
            score: display_score(row.overall),
            raw_score: row.overall,
            subscores: DimensionScores {
                style: row.subscores[0],
                communication: row.subscores[1],
                purpose: row.subscores[2],
                companion: row.subscores[3],
            },
            run_id: row.run_id.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ComputeParams {
    #[serde(default)]
    pub force: bool,
}

/// Compute-or-read a session's ranked results. `?force=true` is the
/// administrative recompute path; everyone else gets the cached set
/// once the session is scored.
pub async fn compute_matches(
    State(state): State<SharedState>,
    Path(session_id): Path<i64>,
    Query(params): Query<ComputeParams>,
) -> Result<Json<Vec<MatchResponse>>, ApiError> {
    let rows = state
        .engine
        .compute(
            &state.store,
            session_id,
            ComputeOptions {
                force: params.force,
            },
        )
        .await?;

    Ok(Json(rows.iter().map(MatchResponse::from).collect()))
}

/// Read-only access to a scored session's persisted results.
pub async fn get_matches(
    State(state): State<SharedState>,
    Path(session_id): Path<i64>,
) -> Result<Json<Vec<MatchResponse>>, ApiError> {
    let session = fetch_session(&state.pool, session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("session {session_id} not found")))?;

    if session.state != SessionState::Scored {
        return Err(ApiError::NotFound(format!(
            "session {session_id} has no persisted results yet"
        )));
    }

    let rows = fetch_match_rows(&state.pool, session_id).await?;
    Ok(Json(rows.iter().map(MatchResponse::from).collect()))
}
