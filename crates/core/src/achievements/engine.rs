use chrono::{DateTime, Utc};

use super::definitions::{ACHIEVEMENTS, AchievementDefinition};
use crate::model::{ExerciseSubmission, ModuleProgress};
use crate::time::EvaluationContext;

/// Earned state of one achievement for one learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AchievementStatus {
    pub definition: AchievementDefinition,
    pub earned: bool,
    pub earned_at: Option<DateTime<Utc>>,
}

/// Evaluates the built-in catalog.
///
/// Pure: the same inputs always give the same statuses, in catalog order.
/// Records in `completed_modules` that are not completed are ignored.
#[must_use]
pub fn evaluate(
    completed_modules: &[ModuleProgress],
    submissions: &[ExerciseSubmission],
    ctx: &EvaluationContext,
) -> Vec<AchievementStatus> {
    evaluate_definitions(ACHIEVEMENTS, completed_modules, submissions, ctx)
}

#[must_use]
pub fn evaluate_definitions(
    definitions: &[AchievementDefinition],
    completed_modules: &[ModuleProgress],
    submissions: &[ExerciseSubmission],
    ctx: &EvaluationContext,
) -> Vec<AchievementStatus> {
    definitions
        .iter()
        .map(|definition| {
            let outcome = definition
                .rule
                .evaluate(completed_modules, submissions, ctx);
            AchievementStatus {
                definition: *definition,
                earned: outcome.earned,
                earned_at: outcome.earned_at,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::submission;
    use crate::time::fixed_now;
    use chrono::Duration;

    #[test]
    fn empty_history_earns_nothing() {
        let statuses = evaluate(&[], &[], &EvaluationContext::utc());
        assert_eq!(statuses.len(), ACHIEVEMENTS.len());
        assert!(statuses.iter().all(|s| !s.earned && s.earned_at.is_none()));
    }

    #[test]
    fn evaluation_is_deterministic() {
        let subs: Vec<_> = (0..12)
            .map(|i| submission(i, Some(95), Some(fixed_now() + Duration::hours(i as i64 * 7))))
            .collect();
        let ctx = EvaluationContext::utc();
        let first = evaluate(&[], &subs, &ctx);
        let second = evaluate(&[], &subs, &ctx);
        assert_eq!(first, second);

        let mut reversed = subs.clone();
        reversed.reverse();
        assert_eq!(first, evaluate(&[], &reversed, &ctx));
    }

    #[test]
    fn malformed_records_do_not_abort_the_catalog() {
        let subs = vec![
            submission(1, Some(250), Some(fixed_now())),
            submission(2, Some(100), None),
            submission(3, Some(-4), None),
        ];
        let statuses = evaluate(&[], &subs, &EvaluationContext::utc());
        assert_eq!(statuses.len(), ACHIEVEMENTS.len());

        let perfect = statuses
            .iter()
            .find(|s| s.definition.id == "perfectionist")
            .unwrap();
        assert!(perfect.earned);
        assert_eq!(perfect.earned_at, None);

        // fixed_now is 22:13 UTC
        let owl = statuses.iter().find(|s| s.definition.id == "night_owl").unwrap();
        assert!(owl.earned);
    }
}
