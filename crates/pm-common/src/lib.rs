pub mod classifier;
pub mod db;
pub mod embed;
pub mod logging;
pub mod matching;
pub mod run_id;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of semantic dimensions a profile is measured along.
pub const DIMENSION_COUNT: usize = 4;

/// One semantic axis of compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Style,
    Communication,
    Purpose,
    Companion,
}

impl Dimension {
    pub const ALL: [Dimension; DIMENSION_COUNT] = [
        Dimension::Style,
        Dimension::Communication,
        Dimension::Purpose,
        Dimension::Companion,
    ];

    pub fn index(self) -> usize {
        match self {
            Dimension::Style => 0,
            Dimension::Communication => 1,
            Dimension::Purpose => 2,
            Dimension::Companion => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::Style => "style",
            Dimension::Communication => "communication",
            Dimension::Purpose => "purpose",
            Dimension::Companion => "companion",
        }
    }
}

/// Lifecycle of a stored embedding. Absence of a vector is a state of
/// its own, not a null to be checked ad hoc.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum VectorState {
    #[default]
    Pending,
    Generated {
        vector: Vec<f32>,
        generated_at: DateTime<Utc>,
    },
}

impl VectorState {
    pub fn vector(&self) -> Option<&[f32]> {
        match self {
            VectorState::Pending => None,
            VectorState::Generated { vector, .. } => Some(vector),
        }
    }

    pub fn is_generated(&self) -> bool {
        matches!(self, VectorState::Generated { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerModality {
    TextChoice,
    ImageChoice,
}

impl AnswerModality {
    pub fn as_str(self) -> &'static str {
        match self {
            AnswerModality::TextChoice => "text_choice",
            AnswerModality::ImageChoice => "image_choice",
        }
    }
}

/// A published quiz question. Immutable once published; content edits
/// go through re-vectorization of the dependent choices.
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub id: i64,
    pub position: i32,
    pub modality: AnswerModality,
    /// Per-dimension weight this question contributes, indexed by
    /// `Dimension::index`.
    pub weights: [f32; DIMENSION_COUNT],
}

/// One selectable answer. Text choices carry a label, image choices an
/// image reference; both sides can be present for captioned images.
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    pub id: i64,
    pub question_id: i64,
    pub ordinal: i32,
    pub label: Option<String>,
    pub image_ref: Option<String>,
    pub vector: VectorState,
}

impl Choice {
    /// The text or image reference handed to the vector provider.
    pub fn embed_input(&self) -> Option<&str> {
        self.label.as_deref().or(self.image_ref.as_deref())
    }
}

/// A provider's declared profile: one description and one vector per
/// dimension, plus the completeness flag maintained by the admin side.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CandidateProfile {
    pub id: i64,
    pub dimension_texts: [Option<String>; DIMENSION_COUNT],
    pub dimension_vectors: [VectorState; DIMENSION_COUNT],
    pub profile_complete: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl CandidateProfile {
    /// Narrow to a scoring-eligible view. Returns `None` unless the
    /// completeness flag is set and all four vectors exist, so the
    /// scorer never sees a partial profile.
    pub fn eligible(&self) -> Option<EligibleCandidate> {
        if !self.profile_complete {
            return None;
        }

        let mut vectors: [Vec<f32>; DIMENSION_COUNT] = Default::default();
        for (slot, state) in vectors.iter_mut().zip(self.dimension_vectors.iter()) {
            *slot = state.vector()?.to_vec();
        }

        Some(EligibleCandidate {
            id: self.id,
            vectors,
        })
    }
}

/// A candidate admitted to scoring: all four dimension vectors present
/// by construction.
#[derive(Debug, Clone, PartialEq)]
pub struct EligibleCandidate {
    pub id: i64,
    pub vectors: [Vec<f32>; DIMENSION_COUNT],
}

/// Session lifecycle. `Scored` is terminal; there is no silent re-open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Started,
    Answering,
    Ready,
    Scored,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Started => "started",
            SessionState::Answering => "answering",
            SessionState::Ready => "ready",
            SessionState::Scored => "scored",
        }
    }

    pub fn parse(value: &str) -> Option<SessionState> {
        match value {
            "started" => Some(SessionState::Started),
            "answering" => Some(SessionState::Answering),
            "ready" => Some(SessionState::Ready),
            "scored" => Some(SessionState::Scored),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: i64,
    pub state: SessionState,
    pub completed_at: Option<DateTime<Utc>>,
}

/// An answered (question, choice) pair with everything the aggregator
/// needs already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionAnswer {
    pub question: Question,
    pub choice: Choice,
}

/// One persisted row of a session's ranked result set.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRow {
    pub session_id: i64,
    pub candidate_id: i64,
    pub rank: i32,
    pub overall: f64,
    pub subscores: [f64; DIMENSION_COUNT],
    pub run_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}
