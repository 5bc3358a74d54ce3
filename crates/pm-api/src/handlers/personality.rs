use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;

use pm_common::classifier::{classify, ClassifierAnswer, PersonalityCode};
use pm_common::db::{fetch_session, fetch_session_answers};

use crate::error::ApiError;
use crate::SharedState;

#[derive(Debug, Serialize)]
pub struct PersonalityResponse {
    pub session_id: i64,
    pub code: PersonalityCode,
    pub scores: BTreeMap<PersonalityCode, u32>,
    pub answered: usize,
}

/// Classify a session's answers into one of the nine personality codes.
/// Works on whatever answers exist; a partially answered session simply
/// scores lower across the board.
pub async fn get_personality(
    State(state): State<SharedState>,
    Path(session_id): Path<i64>,
) -> Result<Json<PersonalityResponse>, ApiError> {
    fetch_session(&state.pool, session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("session {session_id} not found")))?;

    let answers = fetch_session_answers(&state.pool, session_id).await?;

    let classifier_answers: Vec<ClassifierAnswer> = answers
        .iter()
        .map(|answer| {
            let question_position = u16::try_from(answer.question.position).map_err(|_| {
                ApiError::Internal(format!(
                    "question {} has out-of-range position {}",
                    answer.question.id, answer.question.position
                ))
            })?;
            let choice_ordinal = u16::try_from(answer.choice.ordinal).map_err(|_| {
                ApiError::Internal(format!(
                    "choice {} has out-of-range ordinal {}",
                    answer.choice.id, answer.choice.ordinal
                ))
            })?;
            Ok(ClassifierAnswer {
                question_position,
                choice_ordinal,
            })
        })
        .collect::<Result<_, ApiError>>()?;

    let outcome = classify(&classifier_answers, &state.contribution_table);

    Ok(Json(PersonalityResponse {
        session_id,
        code: outcome.code,
        scores: outcome.scores,
        answered: classifier_answers.len(),
    }))
}
