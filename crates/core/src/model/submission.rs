use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::model::ids::{ExerciseId, ModuleId, SectionId, SubmissionId, UserId};

/// Free-form answers collected by an exercise form, keyed by field name.
pub type Responses = BTreeMap<String, Value>;

pub const MAX_SCORE: i64 = 100;

/// A submission field that cannot be used by a rule.
///
/// Handled inside the achievement engine: the record is skipped by the rules
/// that need the field and still counts everywhere else.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MalformedRecordError {
    #[error("submission {0} has no valid submitted_at timestamp")]
    MissingTimestamp(SubmissionId),

    #[error("submission {id} has score {score} outside 0..=100")]
    ScoreOutOfRange { id: SubmissionId, score: i64 },
}

/// One append-only ledger entry. Fields are kept as read from the ledger so that
/// a bad timestamp or score does not make the whole record unreadable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseSubmission {
    pub id: SubmissionId,
    pub user_id: UserId,
    pub module_id: ModuleId,
    pub exercise_id: ExerciseId,
    pub section_id: SectionId,
    #[serde(default)]
    pub responses: Responses,
    pub score: Option<i64>,
    #[serde(default)]
    pub feedback: String,
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub time_spent_secs: u32,
}

impl ExerciseSubmission {
    /// The submission timestamp.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRecordError::MissingTimestamp` when absent or unparseable.
    pub fn timestamp(&self) -> Result<DateTime<Utc>, MalformedRecordError> {
        self.submitted_at
            .ok_or(MalformedRecordError::MissingTimestamp(self.id))
    }

    /// The validated score, `None` for ungraded exercises.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRecordError::ScoreOutOfRange` for scores outside 0..=100.
    pub fn checked_score(&self) -> Result<Option<u8>, MalformedRecordError> {
        match self.score {
            None => Ok(None),
            Some(score) if (0..=MAX_SCORE).contains(&score) => Ok(u8::try_from(score).ok()),
            Some(score) => Err(MalformedRecordError::ScoreOutOfRange { id: self.id, score }),
        }
    }
}

/// Most recent submission by `submitted_at`; records without a timestamp are
/// only picked when nothing else is available.
#[must_use]
pub fn latest_submission(submissions: &[ExerciseSubmission]) -> Option<&ExerciseSubmission> {
    submissions
        .iter()
        .max_by_key(|s| (s.submitted_at.is_some(), s.submitted_at, s.id))
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
