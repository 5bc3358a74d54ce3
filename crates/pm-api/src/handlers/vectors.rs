use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use pm_common::db::{
    fetch_choice, fetch_pending_candidate_items, fetch_pending_choice_items,
    CandidateDimensionSink, ChoiceVectorSink,
};
use pm_common::embed::{BatchItem, BatchReport, EmbedInput, ItemOutcome};

use crate::error::ApiError;
use crate::SharedState;

/// Cap on how many pending items one batch trigger picks up.
const BATCH_FETCH_LIMIT: i64 = 500;

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcomeDto {
    Generated { dimension: usize },
    Failed { reason: String },
}

impl From<&ItemOutcome> for ItemOutcomeDto {
    fn from(outcome: &ItemOutcome) -> Self {
        match outcome {
            ItemOutcome::Generated { dimension } => ItemOutcomeDto::Generated {
                dimension: *dimension,
            },
            ItemOutcome::Failed { reason } => ItemOutcomeDto::Failed {
                reason: reason.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BatchItemDto {
    pub item_id: i64,
    #[serde(flatten)]
    pub outcome: ItemOutcomeDto,
}

#[derive(Debug, Serialize)]
pub struct BatchReportDto {
    pub run_id: String,
    pub success_count: usize,
    pub failure_count: usize,
    pub cancelled: bool,
    pub items: Vec<BatchItemDto>,
}

impl From<&BatchReport> for BatchReportDto {
    fn from(report: &BatchReport) -> Self {
        Self {
            run_id: report.run_id.clone(),
            success_count: report.success_count,
            failure_count: report.failure_count,
            cancelled: report.cancelled,
            items: report
                .items
                .iter()
                .map(|item| BatchItemDto {
                    item_id: item.item_id,
                    outcome: (&item.outcome).into(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SingleVectorResponse {
    pub choice_id: i64,
    #[serde(flatten)]
    pub outcome: ItemOutcomeDto,
}

/// Vectorize one choice immediately, overwriting any stored vector.
pub async fn vectorize_choice(
    State(state): State<SharedState>,
    Path(choice_id): Path<i64>,
) -> Result<Json<SingleVectorResponse>, ApiError> {
    let choice = fetch_choice(&state.pool, choice_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("choice {choice_id} not found")))?;

    let input = match (&choice.label, &choice.image_ref) {
        (Some(label), _) => EmbedInput::Text(label.clone()),
        (None, Some(image_ref)) => EmbedInput::Image(image_ref.clone()),
        (None, None) => {
            return Err(ApiError::BadRequest(format!(
                "choice {choice_id} has no embeddable content"
            )))
        }
    };

    let sink = ChoiceVectorSink::new(state.pool.clone());
    let item = BatchItem {
        id: choice_id,
        input,
    };
    let outcome = state
        .vectorizer
        .generate_one(state.provider.as_ref(), &sink, &item)
        .await;

    Ok(Json(SingleVectorResponse {
        choice_id,
        outcome: (&outcome).into(),
    }))
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub choices: BatchReportDto,
    pub candidates: BatchReportDto,
}

/// Drain everything still pending: published choices first, then
/// candidate dimension descriptions. Runs inline and sequentially;
/// per-item failures are reported, never raised.
pub async fn vectorize_pending(
    State(state): State<SharedState>,
) -> Result<Json<BatchResponse>, ApiError> {
    let choice_items = fetch_pending_choice_items(&state.pool, BATCH_FETCH_LIMIT).await?;
    let candidate_items = fetch_pending_candidate_items(&state.pool, BATCH_FETCH_LIMIT).await?;

    let choice_sink = ChoiceVectorSink::new(state.pool.clone());
    let candidate_sink = CandidateDimensionSink::new(state.pool.clone());

    let choices = state
        .vectorizer
        .run(state.provider.as_ref(), &choice_sink, &choice_items, None)
        .await;
    let candidates = state
        .vectorizer
        .run(
            state.provider.as_ref(),
            &candidate_sink,
            &candidate_items,
            None,
        )
        .await;

    Ok(Json(BatchResponse {
        choices: (&choices).into(),
        candidates: (&candidates).into(),
    }))
}
