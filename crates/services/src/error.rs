//! Shared error types for the services crate.

use thiserror::Error;

use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;
use wellness_core::gate::GateError;
use wellness_core::model::{CatalogError, ExerciseId, ModuleId, SectionId};

/// Errors emitted by `ProgressService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressServiceError {
    #[error("module {0} not found")]
    ModuleNotFound(ModuleId),
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `CatalogService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogServiceError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors returned by an `ExerciseGrader`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GradingError {
    #[error("response `{field}` is invalid: {reason}")]
    InvalidResponse { field: String, reason: String },
}

/// Errors emitted by `SubmissionService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SubmissionError {
    #[error("module {0} not found")]
    ModuleNotFound(ModuleId),
    #[error("section {section} not found in module {module}")]
    SectionNotFound { module: ModuleId, section: SectionId },
    #[error("exercise {exercise} not found in section {section}")]
    ExerciseNotFound {
        section: SectionId,
        exercise: ExerciseId,
    },
    #[error(transparent)]
    Grading(#[from] GradingError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `AchievementService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AchievementServiceError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
