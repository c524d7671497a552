use std::sync::Arc;

use storage::repository::{ModuleRepository, NewSubmission, SubmissionQuery, SubmissionRepository};
use wellness_core::model::{
    ExerciseId, ExerciseSubmission, ModuleId, Responses, SectionId, UserId, latest_submission,
};

use super::grader::{ExerciseGrader, ReportedScoreGrader};
use crate::Clock;
use crate::error::SubmissionError;

/// A learner's answers to one exercise, before grading.
#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseAttempt {
    pub user_id: UserId,
    pub module_id: ModuleId,
    pub section_id: SectionId,
    pub exercise_id: ExerciseId,
    pub responses: Responses,
    pub time_spent_secs: u32,
}

/// Grades exercise attempts and appends them to the ledger.
#[derive(Clone)]
pub struct SubmissionService {
    clock: Clock,
    modules: Arc<dyn ModuleRepository>,
    submissions: Arc<dyn SubmissionRepository>,
    grader: Arc<dyn ExerciseGrader>,
}

impl SubmissionService {
    #[must_use]
    pub fn new(
        clock: Clock,
        modules: Arc<dyn ModuleRepository>,
        submissions: Arc<dyn SubmissionRepository>,
    ) -> Self {
        Self {
            clock,
            modules,
            submissions,
            grader: Arc::new(ReportedScoreGrader),
        }
    }

    #[must_use]
    pub fn with_grader(mut self, grader: Arc<dyn ExerciseGrader>) -> Self {
        self.grader = grader;
        self
    }

    /// Validate, grade and record an attempt.
    ///
    /// # Errors
    ///
    /// Returns `SubmissionError::ModuleNotFound`, `SectionNotFound` or
    /// `ExerciseNotFound` when the attempt does not match the catalog.
    /// Returns `SubmissionError::Grading` if the grader rejects the responses.
    /// Returns `SubmissionError::Storage` if the ledger cannot be written.
    pub async fn submit_exercise(
        &self,
        attempt: ExerciseAttempt,
    ) -> Result<ExerciseSubmission, SubmissionError> {
        let module = self
            .modules
            .get_module(&attempt.module_id)
            .await?
            .ok_or_else(|| SubmissionError::ModuleNotFound(attempt.module_id.clone()))?;
        let section =
            module
                .section(&attempt.section_id)
                .ok_or_else(|| SubmissionError::SectionNotFound {
                    module: module.id.clone(),
                    section: attempt.section_id.clone(),
                })?;
        let exercise =
            section
                .exercise(&attempt.exercise_id)
                .ok_or_else(|| SubmissionError::ExerciseNotFound {
                    section: section.id.clone(),
                    exercise: attempt.exercise_id.clone(),
                })?;

        let grade = self.grader.grade(exercise, &attempt.responses)?;
        let stored = self
            .submissions
            .append_submission(NewSubmission {
                user_id: attempt.user_id,
                module_id: attempt.module_id,
                exercise_id: attempt.exercise_id,
                section_id: attempt.section_id,
                responses: attempt.responses,
                score: grade.score.map(i64::from),
                feedback: grade.feedback,
                submitted_at: self.clock.now(),
                time_spent_secs: attempt.time_spent_secs,
            })
            .await?;

        tracing::debug!(
            submission = %stored.id,
            user = %stored.user_id,
            exercise = %stored.exercise_id,
            score = ?stored.score,
            "exercise submitted"
        );
        Ok(stored)
    }

    /// The learner's ledger, optionally narrowed to a module or exercise.
    ///
    /// # Errors
    ///
    /// Returns `SubmissionError::Storage` if the ledger cannot be read.
    pub async fn submissions(
        &self,
        user_id: &UserId,
        query: &SubmissionQuery,
    ) -> Result<Vec<ExerciseSubmission>, SubmissionError> {
        Ok(self.submissions.list_submissions(user_id, query).await?)
    }

    /// Most recent attempt at an exercise.
    ///
    /// # Errors
    ///
    /// Returns `SubmissionError::Storage` if the ledger cannot be read.
    pub async fn latest_submission(
        &self,
        user_id: &UserId,
        module_id: &ModuleId,
        exercise_id: &ExerciseId,
    ) -> Result<Option<ExerciseSubmission>, SubmissionError> {
        let query = SubmissionQuery::for_exercise(module_id.clone(), exercise_id.clone());
        let history = self.submissions.list_submissions(user_id, &query).await?;
        Ok(latest_submission(&history).cloned())
    }
}
