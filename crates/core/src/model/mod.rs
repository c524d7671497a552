mod ids;
mod module;
mod progress;
mod submission;

pub use ids::{ExerciseId, ModuleId, ParseIdError, SectionId, SubmissionId, UserId};
pub use module::{
    CatalogError, ExerciseKind, ModuleCatalog, ModuleExercise, ModuleSection, TrainingModule,
};
pub use progress::{ModuleProgress, ProgressError, ProgressStatus, percentage};
pub use submission::{
    ExerciseSubmission, MAX_SCORE, MalformedRecordError, Responses, latest_submission,
};
