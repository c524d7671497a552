use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::achievement_service::AchievementService;
use crate::catalog_service::CatalogService;
use crate::error::AppServicesError;
use crate::progress::ProgressService;
use crate::submissions::SubmissionService;

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    catalog: Arc<CatalogService>,
    progress: Arc<ProgressService>,
    submissions: Arc<SubmissionService>,
    achievements: Arc<AchievementService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(&storage, clock))
    }

    /// Build services over in-memory storage.
    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        Self::from_storage(&Storage::in_memory(), clock)
    }

    #[must_use]
    pub fn from_storage(storage: &Storage, clock: Clock) -> Self {
        let catalog = Arc::new(CatalogService::new(Arc::clone(&storage.modules)));
        let progress = Arc::new(ProgressService::new(
            clock,
            Arc::clone(&storage.modules),
            Arc::clone(&storage.progress),
        ));
        let submissions = Arc::new(SubmissionService::new(
            clock,
            Arc::clone(&storage.modules),
            Arc::clone(&storage.submissions),
        ));
        let achievements = Arc::new(AchievementService::new(
            Arc::clone(&storage.modules),
            Arc::clone(&storage.progress),
            Arc::clone(&storage.submissions),
        ));

        Self {
            catalog,
            progress,
            submissions,
            achievements,
        }
    }

    #[must_use]
    pub fn catalog(&self) -> Arc<CatalogService> {
        Arc::clone(&self.catalog)
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn submissions(&self) -> Arc<SubmissionService> {
        Arc::clone(&self.submissions)
    }

    #[must_use]
    pub fn achievements(&self) -> Arc<AchievementService> {
        Arc::clone(&self.achievements)
    }
}
