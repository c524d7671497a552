#![forbid(unsafe_code)]

pub mod achievement_service;
pub mod app_services;
pub mod catalog_service;
pub mod error;
pub mod progress;
pub mod submissions;

pub use wellness_core::{Clock, EvaluationContext};

pub use achievement_service::{AchievementReport, AchievementService};
pub use app_services::AppServices;
pub use catalog_service::CatalogService;
pub use error::{
    AchievementServiceError, AppServicesError, CatalogServiceError, GradingError,
    ProgressServiceError, SubmissionError,
};
pub use progress::{
    ModuleSession, OpenedModule, PersistenceWarning, ProgressService, Reconciliation,
    RefreshTicket, SectionOutcome,
};
pub use submissions::{
    ExerciseAttempt, ExerciseGrader, Grade, ReportedScoreGrader, SubmissionService,
};
