//! Personality classifier: a pure scorer from an ordered answer set to
//! one of nine fixed category codes.
//!
//! The per-answer contribution table is authored content, not derived
//! data; the code only accumulates and takes the argmax. No I/O, no
//! randomness: identical answers always classify identically, which
//! support relies on when reproducing a user's result.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// The nine personality categories. Declaration order is the fixed
/// tie-break priority: when two categories accumulate the same score,
/// the one declared first wins.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PersonalityCode {
    Visionary,
    Storyteller,
    Harmonizer,
    Director,
    Explorer,
    Minimalist,
    Romantic,
    Documentarian,
    Classicist,
}

impl PersonalityCode {
    pub const PRIORITY: [PersonalityCode; 9] = [
        PersonalityCode::Visionary,
        PersonalityCode::Storyteller,
        PersonalityCode::Harmonizer,
        PersonalityCode::Director,
        PersonalityCode::Explorer,
        PersonalityCode::Minimalist,
        PersonalityCode::Romantic,
        PersonalityCode::Documentarian,
        PersonalityCode::Classicist,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PersonalityCode::Visionary => "visionary",
            PersonalityCode::Storyteller => "storyteller",
            PersonalityCode::Harmonizer => "harmonizer",
            PersonalityCode::Director => "director",
            PersonalityCode::Explorer => "explorer",
            PersonalityCode::Minimalist => "minimalist",
            PersonalityCode::Romantic => "romantic",
            PersonalityCode::Documentarian => "documentarian",
            PersonalityCode::Classicist => "classicist",
        }
    }
}

/// One answered question, identified by ordinal positions so the table
/// survives id churn between environments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierAnswer {
    pub question_position: u16,
    pub choice_ordinal: u16,
}

/// Content-authored point contributions per (question, choice).
#[derive(Debug, Clone, Default)]
pub struct ContributionTable {
    entries: HashMap<(u16, u16), Vec<(PersonalityCode, u32)>>,
}

impl ContributionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        question_position: u16,
        choice_ordinal: u16,
        code: PersonalityCode,
        points: u32,
    ) -> Self {
        self.entries
            .entry((question_position, choice_ordinal))
            .or_default()
            .push((code, points));
        self
    }

    pub fn contributions(&self, answer: &ClassifierAnswer) -> &[(PersonalityCode, u32)] {
        self.entries
            .get(&(answer.question_position, answer.choice_ordinal))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn from_rows(rows: impl IntoIterator<Item = ContributionRow>) -> Self {
        rows.into_iter().fold(Self::new(), |table, row| {
            table.with(
                row.question_position,
                row.choice_ordinal,
                row.code,
                row.points,
            )
        })
    }

    /// Load an authored table from its JSON row form.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let rows: Vec<ContributionRow> = serde_json::from_str(raw)?;
        Ok(Self::from_rows(rows))
    }
}

/// Serialized form of one authored contribution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ContributionRow {
    pub question_position: u16,
    pub choice_ordinal: u16,
    pub code: PersonalityCode,
    pub points: u32,
}

/// Classification result: the winning code plus the full score map for
/// downstream explainability. Every code appears in the map, including
/// zero scorers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifierOutcome {
    pub code: PersonalityCode,
    pub scores: BTreeMap<PersonalityCode, u32>,
}

/// Accumulate points per category and return the argmax, breaking ties
/// by the fixed `PersonalityCode::PRIORITY` order.
pub fn classify(answers: &[ClassifierAnswer], table: &ContributionTable) -> ClassifierOutcome {
    let mut scores: BTreeMap<PersonalityCode, u32> =
        PersonalityCode::PRIORITY.iter().map(|c| (*c, 0)).collect();

    for answer in answers {
        for (code, points) in table.contributions(answer) {
            *scores.entry(*code).or_insert(0) += points;
        }
    }

    // First code in priority order holding the maximum wins.
    let mut winner = PersonalityCode::PRIORITY[0];
    let mut best = 0u32;
    for code in PersonalityCode::PRIORITY {
        let score = scores[&code];
        if score > best {
            best = score;
            winner = code;
        }
    }

    ClassifierOutcome {
        code: winner,
        scores,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(question_position: u16, choice_ordinal: u16) -> ClassifierAnswer {
        ClassifierAnswer {
            question_position,
            choice_ordinal,
        }
    }

    #[test]
    fn accumulates_points_and_returns_argmax() {
        let table = ContributionTable::new()
            .with(1, 0, PersonalityCode::Romantic, 3)
            .with(2, 1, PersonalityCode::Romantic, 3)
            .with(2, 1, PersonalityCode::Director, 1)
            .with(3, 0, PersonalityCode::Director, 4);

        let outcome = classify(&[answer(1, 0), answer(2, 1), answer(3, 0)], &table);

        assert_eq!(outcome.code, PersonalityCode::Romantic);
        assert_eq!(outcome.scores[&PersonalityCode::Romantic], 6);
        assert_eq!(outcome.scores[&PersonalityCode::Director], 5);
    }

    #[test]
    fn ties_break_by_fixed_priority_order() {
        let table = ContributionTable::new()
            .with(1, 0, PersonalityCode::Classicist, 5)
            .with(2, 0, PersonalityCode::Storyteller, 5);

        let outcome = classify(&[answer(1, 0), answer(2, 0)], &table);

        // Storyteller is declared before Classicist.
        assert_eq!(outcome.code, PersonalityCode::Storyteller);
    }

    #[test]
    fn identical_answers_classify_identically() {
        let table = ContributionTable::new()
            .with(1, 0, PersonalityCode::Explorer, 2)
            .with(1, 0, PersonalityCode::Minimalist, 1)
            .with(2, 2, PersonalityCode::Explorer, 1);
        let answers = vec![answer(1, 0), answer(2, 2)];

        let first = classify(&answers, &table);
        let second = classify(&answers, &table);

        assert_eq!(first, second);
    }

    #[test]
    fn unanswered_table_entries_contribute_nothing() {
        let table = ContributionTable::new().with(9, 9, PersonalityCode::Visionary, 100);

        let outcome = classify(&[answer(1, 0)], &table);

        assert!(outcome.scores.values().all(|s| *s == 0));
        // Empty battery falls back to the highest-priority code.
        assert_eq!(outcome.code, PersonalityCode::Visionary);
    }

    #[test]
    fn loads_authored_tables_from_json() {
        let raw = r#"[
            {"question_position": 1, "choice_ordinal": 0, "code": "romantic", "points": 3},
            {"question_position": 1, "choice_ordinal": 1, "code": "director", "points": 2}
        ]"#;

        let table = ContributionTable::from_json(raw).unwrap();

        let outcome = classify(&[answer(1, 0)], &table);
        assert_eq!(outcome.code, PersonalityCode::Romantic);
        assert_eq!(outcome.scores[&PersonalityCode::Romantic], 3);
    }

    #[test]
    fn score_map_covers_all_nine_codes() {
        let outcome = classify(&[], &ContributionTable::new());
        assert_eq!(outcome.scores.len(), 9);
    }

    #[test]
    fn twenty_one_question_battery_targets_one_code() {
        // Every answer gives Harmonizer its largest contribution, with
        // noise points spread over the other codes.
        let mut table = ContributionTable::new();
        let mut answers = Vec::new();
        for q in 1..=21u16 {
            table = table
                .with(q, 0, PersonalityCode::Harmonizer, 3)
                .with(q, 0, PersonalityCode::PRIORITY[(q as usize) % 9], 1);
            answers.push(answer(q, 0));
        }

        let outcome = classify(&answers, &table);

        assert_eq!(outcome.code, PersonalityCode::Harmonizer);
        let max = *outcome.scores.values().max().unwrap();
        let winners = outcome
            .scores
            .iter()
            .filter(|(_, s)| **s == max)
            .count();
        assert_eq!(winners, 1, "harmonizer must be the unique maximum");
    }
}
