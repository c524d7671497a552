mod grader;
mod service;

pub use crate::error::{GradingError, SubmissionError};
pub use grader::{ExerciseGrader, Grade, ReportedScoreGrader, SCORE_FIELD};
pub use service::{ExerciseAttempt, SubmissionService};
