use serde_json::Value;
use wellness_core::model::{ModuleExercise, Responses};

use crate::error::GradingError;

/// Score and feedback assigned to a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grade {
    pub score: Option<u8>,
    pub feedback: String,
}

/// Grading strategy applied before a submission is written to the ledger.
pub trait ExerciseGrader: Send + Sync {
    /// # Errors
    ///
    /// Returns `GradingError` if the responses cannot be graded.
    fn grade(&self, exercise: &ModuleExercise, responses: &Responses)
    -> Result<Grade, GradingError>;
}

/// Trusts a self-reported `score` response.
///
/// Numbers (or numeric strings) are rounded and clamped to `0..=100`.
/// Exercises without a `score` response are recorded ungraded.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportedScoreGrader;

pub const SCORE_FIELD: &str = "score";

impl ExerciseGrader for ReportedScoreGrader {
    fn grade(
        &self,
        _exercise: &ModuleExercise,
        responses: &Responses,
    ) -> Result<Grade, GradingError> {
        let Some(raw) = responses.get(SCORE_FIELD) else {
            return Ok(Grade {
                score: None,
                feedback: "Exercise completed. Well done!".to_owned(),
            });
        };

        let score = reported_score(raw)?;
        Ok(Grade {
            score: Some(score),
            feedback: feedback_for(score).to_owned(),
        })
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn reported_score(raw: &Value) -> Result<u8, GradingError> {
    let invalid = |reason: &str| GradingError::InvalidResponse {
        field: SCORE_FIELD.to_owned(),
        reason: reason.to_owned(),
    };

    let value = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
    .ok_or_else(|| invalid("expected a number"))?;

    let clamped = value.round().clamp(0.0, 100.0);
    Ok(clamped as u8)
}

fn feedback_for(score: u8) -> &'static str {
    match score {
        90.. => "Excellent work!",
        70..=89 => "Good job. A little more practice and you will have it.",
        50..=69 => "Nice effort. Review the section and try again.",
        _ => "Keep going. Every attempt builds the habit.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wellness_core::model::{ExerciseId, ExerciseKind};

    fn quiz() -> ModuleExercise {
        ModuleExercise {
            id: ExerciseId::new("quiz"),
            kind: ExerciseKind::Quiz,
            instructions: String::new(),
            config: Value::Null,
        }
    }

    fn responses(pairs: &[(&str, Value)]) -> Responses {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn missing_score_is_ungraded() {
        let grade = ReportedScoreGrader
            .grade(&quiz(), &responses(&[("mood", Value::from(4))]))
            .unwrap();
        assert_eq!(grade.score, None);
        assert!(!grade.feedback.is_empty());
    }

    #[test]
    fn score_is_clamped_and_rounded() {
        let grade = |v: Value| {
            ReportedScoreGrader
                .grade(&quiz(), &responses(&[("score", v)]))
                .unwrap()
                .score
        };
        assert_eq!(grade(Value::from(140)), Some(100));
        assert_eq!(grade(Value::from(-3)), Some(0));
        assert_eq!(grade(Value::from(89.6)), Some(90));
        assert_eq!(grade(Value::from("75")), Some(75));
    }

    #[test]
    fn non_numeric_score_is_rejected() {
        let err = ReportedScoreGrader
            .grade(&quiz(), &responses(&[("score", Value::Bool(true))]))
            .unwrap_err();
        assert!(matches!(err, GradingError::InvalidResponse { .. }));
    }

    #[test]
    fn feedback_follows_score_bands() {
        assert_eq!(feedback_for(100), "Excellent work!");
        assert_eq!(feedback_for(90), "Excellent work!");
        assert_ne!(feedback_for(89), feedback_for(90));
        assert_ne!(feedback_for(49), feedback_for(50));
    }
}
