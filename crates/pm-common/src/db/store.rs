//! Postgres-backed implementation of the pipeline's `MatchStore` seam.

use async_trait::async_trait;

use crate::db::results::ReplaceOutcome;
use crate::db::{
    candidates, results, sessions, PgPool,
};
use crate::matching::aggregate::AggregateSet;
use crate::matching::pipeline::{MatchStore, StoreError};
use crate::{EligibleCandidate, MatchRow, Session, SessionAnswer};

#[derive(Clone)]
pub struct PgMatchStore {
    pool: PgPool,
}

impl PgMatchStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn backend<E: std::fmt::Display>(err: E) -> StoreError {
    StoreError::Backend(err.to_string())
}

#[async_trait]
impl MatchStore for PgMatchStore {
    async fn session(&self, session_id: i64) -> Result<Option<Session>, StoreError> {
        sessions::fetch_session(&self.pool, session_id)
            .await
            .map_err(backend)
    }

    async fn answers(&self, session_id: i64) -> Result<Vec<SessionAnswer>, StoreError> {
        sessions::fetch_session_answers(&self.pool, session_id)
            .await
            .map_err(backend)
    }

    async fn eligible_candidates(&self) -> Result<Vec<EligibleCandidate>, StoreError> {
        candidates::fetch_eligible_candidates(&self.pool)
            .await
            .map_err(backend)
    }

    async fn results(&self, session_id: i64) -> Result<Vec<MatchRow>, StoreError> {
        results::fetch_match_rows(&self.pool, session_id)
            .await
            .map_err(backend)
    }

    async fn save_aggregates(
        &self,
        session_id: i64,
        set: &AggregateSet,
    ) -> Result<(), StoreError> {
        sessions::save_aggregates(&self.pool, session_id, set)
            .await
            .map_err(backend)
    }

    async fn replace_results(
        &self,
        session_id: i64,
        rows: &[MatchRow],
    ) -> Result<ReplaceOutcome, StoreError> {
        results::replace_results(&self.pool, session_id, rows)
            .await
            .map_err(backend)
    }

    async fn replace_results_forced(
        &self,
        session_id: i64,
        rows: &[MatchRow],
    ) -> Result<ReplaceOutcome, StoreError> {
        results::replace_results_forced(&self.pool, session_id, rows)
            .await
            .map_err(backend)
    }
}
