//! Compute-or-read orchestration for a session's ranked results.
//!
//! `MatchEngine::compute` is the single entry point callers use: it
//! reads the session, runs the aggregator and scorer when needed, and
//! hands the ranked set to storage as one atomic replacement. The
//! engine talks to storage through the narrow `MatchStore` seam rather
//! than a shared client, so the whole flow is testable in memory.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, instrument};

use crate::db::results::ReplaceOutcome;
use crate::matching::aggregate::{aggregate_session, AggregateError, AggregateSet};
use crate::matching::scorer::{rank_candidates, ScoreError, ScoredCandidate, DEFAULT_TOP_K};
use crate::matching::weights::DimensionWeights;
use crate::run_id;
use crate::{EligibleCandidate, MatchRow, Session, SessionAnswer, SessionState};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Everything the pipeline needs from storage, and nothing else.
#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn session(&self, session_id: i64) -> Result<Option<Session>, StoreError>;

    async fn answers(&self, session_id: i64) -> Result<Vec<SessionAnswer>, StoreError>;

    async fn eligible_candidates(&self) -> Result<Vec<EligibleCandidate>, StoreError>;

    async fn results(&self, session_id: i64) -> Result<Vec<MatchRow>, StoreError>;

    async fn save_aggregates(
        &self,
        session_id: i64,
        set: &AggregateSet,
    ) -> Result<(), StoreError>;

    async fn replace_results(
        &self,
        session_id: i64,
        rows: &[MatchRow],
    ) -> Result<ReplaceOutcome, StoreError>;

    async fn replace_results_forced(
        &self,
        session_id: i64,
        rows: &[MatchRow],
    ) -> Result<ReplaceOutcome, StoreError>;
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("session {0} not found")]
    SessionNotFound(i64),
    #[error("session {0} is not in a finalizable state")]
    NotFinalizable(i64),
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error(transparent)]
    Score(#[from] ScoreError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ComputeOptions {
    /// Recompute and replace even when the session is already scored.
    /// Administrative callers only.
    pub force: bool,
}

#[derive(Debug, Clone)]
pub struct MatchEngine {
    pub weights: DimensionWeights,
    pub top_k: usize,
}

impl Default for MatchEngine {
    fn default() -> Self {
        Self {
            weights: DimensionWeights::default(),
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl MatchEngine {
    pub fn from_env() -> Self {
        Self {
            weights: DimensionWeights::from_env(),
            top_k: std::env::var("PM_TOP_K")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_TOP_K),
        }
    }

    fn to_rows(&self, session_id: i64, ranked: &[ScoredCandidate]) -> Vec<MatchRow> {
        ranked
            .iter()
            .enumerate()
            .map(|(idx, scored)| MatchRow {
                session_id,
                candidate_id: scored.candidate_id,
                rank: (idx + 1) as i32,
                overall: scored.overall,
                subscores: scored.subscores,
                run_id: Some(run_id::get().to_string()),
                created_at: None,
            })
            .collect()
    }

    /// Return a session's ranked results, computing and persisting them
    /// first if the session has not been scored yet.
    ///
    /// Already-scored sessions are a cache hit unless `force` is set.
    /// A concurrent finalization race is absorbed here: the losing
    /// writer re-reads the canonical persisted set and returns it.
    #[instrument(skip(self, store), fields(session_id))]
    pub async fn compute(
        &self,
        store: &dyn MatchStore,
        session_id: i64,
        options: ComputeOptions,
    ) -> Result<Vec<MatchRow>, PipelineError> {
        let session = store
            .session(session_id)
            .await?
            .ok_or(PipelineError::SessionNotFound(session_id))?;

        if session.state == SessionState::Scored && !options.force {
            return Ok(store.results(session_id).await?);
        }

        let answers = store.answers(session_id).await?;
        let set = aggregate_session(&answers)?;
        store.save_aggregates(session_id, &set).await?;

        let candidates = store.eligible_candidates().await?;
        let ranked = rank_candidates(&set.vectors, &candidates, &self.weights, self.top_k)?;
        let rows = self.to_rows(session_id, &ranked);

        let outcome = if session.state == SessionState::Scored {
            store.replace_results_forced(session_id, &rows).await?
        } else {
            store.replace_results(session_id, &rows).await?
        };

        if outcome == ReplaceOutcome::Lost {
            // A guard miss means either a concurrent finalizer won, or
            // the session was never `ready` to begin with. Only the
            // former has canonical rows to hand back.
            let current = store
                .session(session_id)
                .await?
                .ok_or(PipelineError::SessionNotFound(session_id))?;
            if current.state != SessionState::Scored {
                return Err(PipelineError::NotFinalizable(session_id));
            }
            info!(session_id, "lost finalization race; reading canonical results");
        }

        // Always hand back the persisted set so repeat reads agree.
        Ok(store.results(session_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use chrono::Utc;

    use super::*;
    use crate::{
        AnswerModality, CandidateProfile, Choice, Question, VectorState, DIMENSION_COUNT,
    };

    struct MemoryStore {
        session: Mutex<Option<Session>>,
        answers: Vec<SessionAnswer>,
        candidates: Vec<EligibleCandidate>,
        results: Mutex<Vec<MatchRow>>,
        aggregates: Mutex<Option<AggregateSet>>,
        replace_calls: AtomicUsize,
        lose_race: bool,
        reject_replace: bool,
    }

    impl MemoryStore {
        fn new(state: SessionState) -> Self {
            Self {
                session: Mutex::new(Some(Session {
                    id: 1,
                    state,
                    completed_at: None,
                })),
                answers: Vec::new(),
                candidates: Vec::new(),
                results: Mutex::new(Vec::new()),
                aggregates: Mutex::new(None),
                replace_calls: AtomicUsize::new(0),
                lose_race: false,
                reject_replace: false,
            }
        }
    }

    #[async_trait]
    impl MatchStore for MemoryStore {
        async fn session(&self, _id: i64) -> Result<Option<Session>, StoreError> {
            Ok(self.session.lock().unwrap().clone())
        }

        async fn answers(&self, _id: i64) -> Result<Vec<SessionAnswer>, StoreError> {
            Ok(self.answers.clone())
        }

        async fn eligible_candidates(&self) -> Result<Vec<EligibleCandidate>, StoreError> {
            Ok(self.candidates.clone())
        }

        async fn results(&self, _id: i64) -> Result<Vec<MatchRow>, StoreError> {
            Ok(self.results.lock().unwrap().clone())
        }

        async fn save_aggregates(
            &self,
            _id: i64,
            set: &AggregateSet,
        ) -> Result<(), StoreError> {
            *self.aggregates.lock().unwrap() = Some(set.clone());
            let mut session = self.session.lock().unwrap();
            if let Some(session) = session.as_mut() {
                if session.state == SessionState::Answering {
                    session.state = SessionState::Ready;
                }
            }
            Ok(())
        }

        async fn replace_results(
            &self,
            _id: i64,
            rows: &[MatchRow],
        ) -> Result<ReplaceOutcome, StoreError> {
            self.replace_calls.fetch_add(1, Ordering::SeqCst);
            if self.reject_replace {
                // Guard miss with no winner: session never reached `ready`.
                return Ok(ReplaceOutcome::Lost);
            }
            if self.lose_race {
                // A concurrent finalizer got there first.
                let mut session = self.session.lock().unwrap();
                if let Some(session) = session.as_mut() {
                    session.state = SessionState::Scored;
                    session.completed_at = Some(Utc::now());
                }
                return Ok(ReplaceOutcome::Lost);
            }
            *self.results.lock().unwrap() = rows.to_vec();
            let mut session = self.session.lock().unwrap();
            if let Some(session) = session.as_mut() {
                session.state = SessionState::Scored;
                session.completed_at = Some(Utc::now());
            }
            Ok(ReplaceOutcome::Written)
        }

        async fn replace_results_forced(
            &self,
            _id: i64,
            rows: &[MatchRow],
        ) -> Result<ReplaceOutcome, StoreError> {
            self.replace_calls.fetch_add(1, Ordering::SeqCst);
            *self.results.lock().unwrap() = rows.to_vec();
            Ok(ReplaceOutcome::Written)
        }
    }

    fn answer(question_id: i64, vector: Vec<f32>) -> SessionAnswer {
        SessionAnswer {
            question: Question {
                id: question_id,
                position: question_id as i32,
                modality: AnswerModality::TextChoice,
                weights: [1.0; DIMENSION_COUNT],
            },
            choice: Choice {
                id: question_id * 10,
                question_id,
                ordinal: 0,
                label: Some("label".into()),
                image_ref: None,
                vector: VectorState::Generated {
                    vector,
                    generated_at: Utc::now(),
                },
            },
        }
    }

    fn candidate(id: i64, base: [f32; 2]) -> EligibleCandidate {
        EligibleCandidate {
            id,
            vectors: [
                base.to_vec(),
                base.to_vec(),
                base.to_vec(),
                base.to_vec(),
            ],
        }
    }

    fn engine() -> MatchEngine {
        MatchEngine::default()
    }

    #[tokio::test]
    async fn computes_persists_and_marks_scored() {
        let mut store = MemoryStore::new(SessionState::Answering);
        store.answers = vec![answer(1, vec![1.0, 0.0]), answer(2, vec![1.0, 0.2])];
        store.candidates = vec![
            candidate(1, [1.0, 0.0]),
            candidate(2, [0.0, 1.0]),
            candidate(3, [1.0, 0.1]),
            candidate(4, [-1.0, 0.0]),
        ];

        let rows = engine()
            .compute(&store, 1, ComputeOptions::default())
            .await
            .unwrap();

        assert_eq!(rows.len(), 3, "top-K bounds the persisted set");
        assert_eq!(
            rows.iter().map(|r| r.rank).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(rows[0].overall >= rows[1].overall);
        assert_eq!(
            store.session.lock().unwrap().as_ref().unwrap().state,
            SessionState::Scored
        );
        assert!(store.aggregates.lock().unwrap().is_some());
    }

    #[tokio::test]
    async fn scored_sessions_are_a_cache_hit() {
        let mut store = MemoryStore::new(SessionState::Answering);
        store.answers = vec![answer(1, vec![1.0, 0.0])];
        store.candidates = vec![candidate(1, [1.0, 0.0])];
        let engine = engine();

        let first = engine
            .compute(&store, 1, ComputeOptions::default())
            .await
            .unwrap();
        let second = engine
            .compute(&store, 1, ComputeOptions::default())
            .await
            .unwrap();

        assert_eq!(first, second, "repeat compute returns identical rows");
        assert_eq!(
            store.replace_calls.load(Ordering::SeqCst),
            1,
            "second call must not write"
        );
    }

    #[tokio::test]
    async fn force_recomputes_a_scored_session() {
        let mut store = MemoryStore::new(SessionState::Answering);
        store.answers = vec![answer(1, vec![1.0, 0.0])];
        store.candidates = vec![candidate(1, [1.0, 0.0])];
        let engine = engine();

        engine
            .compute(&store, 1, ComputeOptions::default())
            .await
            .unwrap();
        engine
            .compute(&store, 1, ComputeOptions { force: true })
            .await
            .unwrap();

        assert_eq!(store.replace_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn losing_the_race_returns_canonical_rows() {
        let mut store = MemoryStore::new(SessionState::Ready);
        store.answers = vec![answer(1, vec![1.0, 0.0])];
        store.candidates = vec![candidate(1, [1.0, 0.0])];
        store.lose_race = true;
        let canonical = vec![MatchRow {
            session_id: 1,
            candidate_id: 99,
            rank: 1,
            overall: 0.5,
            subscores: [0.5; DIMENSION_COUNT],
            run_id: Some("winner".into()),
            created_at: Some(Utc::now()),
        }];
        *store.results.lock().unwrap() = canonical.clone();

        let rows = engine()
            .compute(&store, 1, ComputeOptions::default())
            .await
            .unwrap();

        assert_eq!(rows, canonical, "loser re-reads the winner's rows");
    }

    #[tokio::test]
    async fn guard_miss_without_a_winner_is_not_finalizable() {
        // A `started` session can carry answers without ever becoming
        // `ready`; the replace guard misses and nobody else scored it.
        let mut store = MemoryStore::new(SessionState::Started);
        store.answers = vec![answer(1, vec![1.0, 0.0])];
        store.candidates = vec![candidate(1, [1.0, 0.0])];
        store.reject_replace = true;

        let err = engine()
            .compute(&store, 1, ComputeOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::NotFinalizable(1)));
        assert!(
            store.results.lock().unwrap().is_empty(),
            "nothing may be persisted for an unfinalizable session"
        );
    }

    #[tokio::test]
    async fn missing_session_is_not_found() {
        let store = MemoryStore::new(SessionState::Answering);
        *store.session.lock().unwrap() = None;

        let err = engine()
            .compute(&store, 42, ComputeOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::SessionNotFound(42)));
    }

    #[tokio::test]
    async fn unaggregatable_session_blocks_finalization() {
        let mut store = MemoryStore::new(SessionState::Answering);
        // Single answer whose vector is still pending.
        store.answers = vec![SessionAnswer {
            choice: Choice {
                vector: VectorState::Pending,
                ..answer(1, vec![]).choice
            },
            ..answer(1, vec![])
        }];

        let err = engine()
            .compute(&store, 1, ComputeOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Aggregate(_)));
        assert_ne!(
            store.session.lock().unwrap().as_ref().unwrap().state,
            SessionState::Scored,
            "blocked session must not advance"
        );
    }

    #[tokio::test]
    async fn incomplete_profiles_never_reach_the_ranking() {
        let mut profile = CandidateProfile {
            id: 50,
            profile_complete: true,
            ..Default::default()
        };
        for slot in profile.dimension_vectors.iter_mut().take(3) {
            *slot = VectorState::Generated {
                vector: vec![1.0, 0.0],
                generated_at: Utc::now(),
            };
        }
        // Three of four vectors present: not eligible, however
        // favorable its partial similarity would have been.
        let eligible: Vec<EligibleCandidate> =
            [profile].iter().filter_map(|p| p.eligible()).collect();

        let mut store = MemoryStore::new(SessionState::Answering);
        store.answers = vec![answer(1, vec![1.0, 0.0])];
        store.candidates = eligible;

        let rows = engine()
            .compute(&store, 1, ComputeOptions::default())
            .await
            .unwrap();

        assert!(rows.iter().all(|r| r.candidate_id != 50));
        assert!(rows.is_empty());
    }
}
