use std::sync::Arc;

use storage::repository::{
    ModuleRepository, ProgressRepository, SubmissionQuery, SubmissionRepository, load_catalog,
};
use wellness_core::EvaluationContext;
use wellness_core::achievements::{
    self, AchievementFilter, AchievementStatus, AchievementSummary,
};
use wellness_core::model::UserId;

use crate::error::AchievementServiceError;

/// Filtered, ranked achievements plus totals over the whole catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AchievementReport {
    pub achievements: Vec<AchievementStatus>,
    pub summary: AchievementSummary,
}

/// Evaluates achievements from a learner's full history.
///
/// Every call re-reads the ledger and evaluates from scratch.
#[derive(Clone)]
pub struct AchievementService {
    modules: Arc<dyn ModuleRepository>,
    progress: Arc<dyn ProgressRepository>,
    submissions: Arc<dyn SubmissionRepository>,
}

impl AchievementService {
    #[must_use]
    pub fn new(
        modules: Arc<dyn ModuleRepository>,
        progress: Arc<dyn ProgressRepository>,
        submissions: Arc<dyn SubmissionRepository>,
    ) -> Self {
        Self {
            modules,
            progress,
            submissions,
        }
    }

    /// Status of every achievement, in catalog order.
    ///
    /// # Errors
    ///
    /// Returns `AchievementServiceError::Storage` if the history cannot be read.
    pub async fn statuses(
        &self,
        user_id: &UserId,
        ctx: &EvaluationContext,
    ) -> Result<Vec<AchievementStatus>, AchievementServiceError> {
        let catalog = load_catalog(self.modules.as_ref()).await?;
        let completed: Vec<_> = self
            .progress
            .list_user_progress(user_id, &catalog)
            .await?
            .into_iter()
            .filter(|p| p.is_completed())
            .collect();
        let submissions = self
            .submissions
            .list_submissions(user_id, &SubmissionQuery::all())
            .await?;

        tracing::debug!(
            user = %user_id,
            completed_modules = completed.len(),
            submissions = submissions.len(),
            "evaluating achievements"
        );
        Ok(achievements::evaluate(&completed, &submissions, ctx))
    }

    /// Ranked achievements narrowed by `filter`, with catalog-wide totals.
    ///
    /// # Errors
    ///
    /// Returns `AchievementServiceError::Storage` if the history cannot be read.
    pub async fn report(
        &self,
        user_id: &UserId,
        ctx: &EvaluationContext,
        filter: &AchievementFilter,
    ) -> Result<AchievementReport, AchievementServiceError> {
        let statuses = self.statuses(user_id, ctx).await?;
        let summary = AchievementSummary::from_statuses(&statuses);
        Ok(AchievementReport {
            achievements: achievements::present(statuses, filter),
            summary,
        })
    }
}
