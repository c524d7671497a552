use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use wellness_core::gate::rebuild_progress;
use wellness_core::model::{
    CatalogError, ExerciseId, ExerciseSubmission, ModuleCatalog, ModuleId, ModuleProgress,
    ProgressError, ProgressStatus, Responses, SectionId, SubmissionId, TrainingModule, UserId,
};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A submission about to be appended to the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSubmission {
    pub user_id: UserId,
    pub module_id: ModuleId,
    pub exercise_id: ExerciseId,
    pub section_id: SectionId,
    pub responses: Responses,
    pub score: Option<i64>,
    pub feedback: String,
    pub submitted_at: DateTime<Utc>,
    pub time_spent_secs: u32,
}

impl NewSubmission {
    #[must_use]
    pub fn into_submission(self, id: SubmissionId) -> ExerciseSubmission {
        ExerciseSubmission {
            id,
            user_id: self.user_id,
            module_id: self.module_id,
            exercise_id: self.exercise_id,
            section_id: self.section_id,
            responses: self.responses,
            score: self.score,
            feedback: self.feedback,
            submitted_at: Some(self.submitted_at),
            time_spent_secs: self.time_spent_secs,
        }
    }
}

/// Optional narrowing for ledger reads; an empty query returns the full history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionQuery {
    pub module_id: Option<ModuleId>,
    pub exercise_id: Option<ExerciseId>,
}

impl SubmissionQuery {
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn for_exercise(module_id: ModuleId, exercise_id: ExerciseId) -> Self {
        Self {
            module_id: Some(module_id),
            exercise_id: Some(exercise_id),
        }
    }

    #[must_use]
    pub fn matches(&self, submission: &ExerciseSubmission) -> bool {
        self.module_id
            .as_ref()
            .is_none_or(|m| &submission.module_id == m)
            && self
                .exercise_id
                .as_ref()
                .is_none_or(|e| &submission.exercise_id == e)
    }
}

/// Module reference data.
#[async_trait]
pub trait ModuleRepository: Send + Sync {
    /// Persist or replace a module.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the module cannot be stored.
    async fn upsert_module(&self, module: &TrainingModule) -> Result<(), StorageError>;

    /// Fetch a module by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read or decode failures.
    async fn get_module(&self, id: &ModuleId) -> Result<Option<TrainingModule>, StorageError>;

    /// All modules ordered by `number`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read or decode failures.
    async fn list_modules(&self) -> Result<Vec<TrainingModule>, StorageError>;
}

/// Load every stored module as an ordered catalog.
///
/// # Errors
///
/// Returns `StorageError::Serialization` if the stored modules do not form a
/// valid catalog.
pub async fn load_catalog(modules: &dyn ModuleRepository) -> Result<ModuleCatalog, StorageError> {
    let list = modules.list_modules().await?;
    ModuleCatalog::new(list).map_err(|e: CatalogError| StorageError::Serialization(e.to_string()))
}

/// Per-learner module progress.
///
/// Reads take the module reference data so records can be checked against it.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fetch the learner's record for a module, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures or records that do not fit the module.
    async fn get_module_progress(
        &self,
        user_id: &UserId,
        module: &TrainingModule,
    ) -> Result<Option<ModuleProgress>, StorageError>;

    /// Return the existing record or create an `in_progress` one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be read or created.
    async fn start_module(
        &self,
        user_id: &UserId,
        module: &TrainingModule,
        now: DateTime<Utc>,
    ) -> Result<ModuleProgress, StorageError>;

    /// Persist a section completion and return the stored record.
    ///
    /// `progress` is merged into what the ledger already holds: completed
    /// sections are only ever added, and status follows the merged coverage.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if `progress` is for another module or
    /// does not include `section_id`, and other `StorageError`s if the write
    /// cannot be committed.
    async fn record_section_completion(
        &self,
        module: &TrainingModule,
        progress: &ModuleProgress,
        section_id: &SectionId,
        now: DateTime<Utc>,
    ) -> Result<ModuleProgress, StorageError>;

    /// All of the learner's records for modules in the catalog.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn list_user_progress(
        &self,
        user_id: &UserId,
        catalog: &ModuleCatalog,
    ) -> Result<Vec<ModuleProgress>, StorageError>;
}

/// Progress columns as a backend stored them, not yet checked against the module.
#[derive(Debug, Clone)]
pub(crate) struct PersistedProgress {
    pub user_id: UserId,
    pub module_id: ModuleId,
    pub status: ProgressStatus,
    pub completed: BTreeSet<SectionId>,
    pub current_section: Option<SectionId>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&ModuleProgress> for PersistedProgress {
    fn from(progress: &ModuleProgress) -> Self {
        Self {
            user_id: progress.user_id().clone(),
            module_id: progress.module_id().clone(),
            status: progress.status(),
            completed: progress.completed_sections().clone(),
            current_section: progress.current_section().cloned(),
            started_at: progress.started_at(),
            completed_at: progress.completed_at(),
        }
    }
}

impl PersistedProgress {
    /// Rehydrates the record against the module's current sections.
    ///
    /// A record that no longer fits, e.g. after the module gained a section, is
    /// rebuilt from its completed sections instead of failing the read.
    pub(crate) fn restore(self, module: &TrainingModule) -> Result<ModuleProgress, StorageError> {
        let completed = self.completed.clone();
        match ModuleProgress::from_persisted(
            self.user_id.clone(),
            module,
            self.module_id,
            self.status,
            self.completed,
            self.current_section,
            self.started_at,
            self.completed_at,
        ) {
            Ok(progress) => Ok(progress),
            Err(err @ ProgressError::ModuleMismatch { .. }) => {
                Err(StorageError::Serialization(err.to_string()))
            }
            Err(err) => {
                tracing::warn!(
                    user = %self.user_id,
                    module = %module.id,
                    error = %err,
                    "progress record does not fit its module, rebuilding from completed sections"
                );
                let finished_at = self.completed_at.unwrap_or(self.started_at);
                Ok(rebuild_progress(
                    module,
                    self.user_id,
                    &completed,
                    self.started_at,
                    finished_at,
                ))
            }
        }
    }
}

/// Folds an incoming completion into the stored record.
pub(crate) fn merge_progress(
    module: &TrainingModule,
    stored: Option<&ModuleProgress>,
    incoming: &ModuleProgress,
    section_id: &SectionId,
    now: DateTime<Utc>,
) -> Result<ModuleProgress, StorageError> {
    if incoming.module_id() != &module.id || !incoming.is_section_completed(section_id) {
        return Err(StorageError::Conflict);
    }
    let Some(stored) = stored else {
        return Ok(incoming.clone());
    };

    let completed: BTreeSet<SectionId> = stored
        .completed_sections()
        .union(incoming.completed_sections())
        .cloned()
        .collect();
    let finished_at = stored
        .completed_at()
        .or(incoming.completed_at())
        .unwrap_or(now);
    Ok(rebuild_progress(
        module,
        stored.user_id().clone(),
        &completed,
        stored.started_at(),
        finished_at,
    ))
}

/// Append-only exercise submission ledger.
#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    /// Append a submission and return it with its ledger id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write cannot be committed.
    async fn append_submission(
        &self,
        submission: NewSubmission,
    ) -> Result<ExerciseSubmission, StorageError>;

    /// The learner's submissions in ledger order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn list_submissions(
        &self,
        user_id: &UserId,
        query: &SubmissionQuery,
    ) -> Result<Vec<ExerciseSubmission>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    modules: Arc<Mutex<BTreeMap<ModuleId, TrainingModule>>>,
    progress: Arc<Mutex<HashMap<(UserId, ModuleId), ModuleProgress>>>,
    submissions: Arc<Mutex<Vec<ExerciseSubmission>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl ModuleRepository for InMemoryRepository {
    async fn upsert_module(&self, module: &TrainingModule) -> Result<(), StorageError> {
        let mut guard = self.modules.lock().map_err(poisoned)?;
        guard.insert(module.id.clone(), module.clone());
        Ok(())
    }

    async fn get_module(&self, id: &ModuleId) -> Result<Option<TrainingModule>, StorageError> {
        let guard = self.modules.lock().map_err(poisoned)?;
        Ok(guard.get(id).cloned())
    }

    async fn list_modules(&self) -> Result<Vec<TrainingModule>, StorageError> {
        let guard = self.modules.lock().map_err(poisoned)?;
        let mut modules: Vec<_> = guard.values().cloned().collect();
        modules.sort_by_key(|m| m.number);
        Ok(modules)
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn get_module_progress(
        &self,
        user_id: &UserId,
        module: &TrainingModule,
    ) -> Result<Option<ModuleProgress>, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        guard
            .get(&(user_id.clone(), module.id.clone()))
            .map(|record| PersistedProgress::from(record).restore(module))
            .transpose()
    }

    async fn start_module(
        &self,
        user_id: &UserId,
        module: &TrainingModule,
        now: DateTime<Utc>,
    ) -> Result<ModuleProgress, StorageError> {
        let mut guard = self.progress.lock().map_err(poisoned)?;
        let record = guard
            .entry((user_id.clone(), module.id.clone()))
            .or_insert_with(|| ModuleProgress::start(user_id.clone(), module, now));
        PersistedProgress::from(&*record).restore(module)
    }

    async fn record_section_completion(
        &self,
        module: &TrainingModule,
        progress: &ModuleProgress,
        section_id: &SectionId,
        now: DateTime<Utc>,
    ) -> Result<ModuleProgress, StorageError> {
        let mut guard = self.progress.lock().map_err(poisoned)?;
        let key = (progress.user_id().clone(), module.id.clone());
        let stored = guard
            .get(&key)
            .map(|record| PersistedProgress::from(record).restore(module))
            .transpose()?;
        let merged = merge_progress(module, stored.as_ref(), progress, section_id, now)?;
        guard.insert(key, merged.clone());
        Ok(merged)
    }

    async fn list_user_progress(
        &self,
        user_id: &UserId,
        catalog: &ModuleCatalog,
    ) -> Result<Vec<ModuleProgress>, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        catalog
            .iter()
            .filter_map(|m| {
                guard
                    .get(&(user_id.clone(), m.id.clone()))
                    .map(|record| PersistedProgress::from(record).restore(m))
            })
            .collect()
    }
}

#[async_trait]
impl SubmissionRepository for InMemoryRepository {
    async fn append_submission(
        &self,
        submission: NewSubmission,
    ) -> Result<ExerciseSubmission, StorageError> {
        let mut guard = self.submissions.lock().map_err(poisoned)?;
        let next = u64::try_from(guard.len() + 1)
            .map_err(|_| StorageError::Serialization("submission id overflow".into()))?;
        let stored = submission.into_submission(SubmissionId::new(next));
        guard.push(stored.clone());
        Ok(stored)
    }

    async fn list_submissions(
        &self,
        user_id: &UserId,
        query: &SubmissionQuery,
    ) -> Result<Vec<ExerciseSubmission>, StorageError> {
        let guard = self.submissions.lock().map_err(poisoned)?;
        Ok(guard
            .iter()
            .filter(|s| &s.user_id == user_id && query.matches(s))
            .cloned()
            .collect())
    }
}

/// The ledger seen by services: module catalog, progress records and submissions.
#[derive(Clone)]
pub struct Storage {
    pub modules: Arc<dyn ModuleRepository>,
    pub progress: Arc<dyn ProgressRepository>,
    pub submissions: Arc<dyn SubmissionRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            modules: Arc::new(repo.clone()),
            progress: Arc::new(repo.clone()),
            submissions: Arc::new(repo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use wellness_core::gate::complete_section;
    use wellness_core::model::{ExerciseKind, ModuleExercise, ModuleSection};
    use wellness_core::time::fixed_now;

    fn build_module(id: &str, number: u32) -> TrainingModule {
        TrainingModule {
            id: ModuleId::new(id),
            number,
            title: format!("Module {number}"),
            description: None,
            sections: vec![ModuleSection {
                id: SectionId::new(format!("{id}-intro")),
                number: 1,
                title: "Intro".into(),
                content: Vec::new(),
                exercises: vec![ModuleExercise {
                    id: ExerciseId::new(format!("{id}-mood")),
                    kind: ExerciseKind::MoodTracker,
                    instructions: String::new(),
                    config: Value::Null,
                }],
            }],
        }
    }

    fn build_sized(id: &str, sections: usize) -> TrainingModule {
        let base = build_module(id, 1);
        TrainingModule {
            sections: (0..sections)
                .map(|i| ModuleSection {
                    id: SectionId::new(format!("{id}-s{i}")),
                    number: u32::try_from(i + 1).unwrap(),
                    ..base.sections[0].clone()
                })
                .collect(),
            ..base
        }
    }

    fn new_submission(user: &str, module: &str) -> NewSubmission {
        NewSubmission {
            user_id: UserId::new(user),
            module_id: ModuleId::new(module),
            exercise_id: ExerciseId::new(format!("{module}-mood")),
            section_id: SectionId::new(format!("{module}-intro")),
            responses: Responses::new(),
            score: Some(80),
            feedback: "ok".into(),
            submitted_at: fixed_now(),
            time_spent_secs: 30,
        }
    }

    #[tokio::test]
    async fn start_module_is_get_or_create() {
        let repo = InMemoryRepository::new();
        let module = build_module("m1", 1);
        let user = UserId::new("u");

        assert!(repo.get_module_progress(&user, &module).await.unwrap().is_none());
        let first = repo.start_module(&user, &module, fixed_now()).await.unwrap();
        let later = fixed_now() + chrono::Duration::days(1);
        let second = repo.start_module(&user, &module, later).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(second.started_at(), fixed_now());
    }

    #[tokio::test]
    async fn completion_is_persisted() {
        let repo = InMemoryRepository::new();
        let module = build_module("m1", 1);
        let user = UserId::new("u");
        let mut progress = repo.start_module(&user, &module, fixed_now()).await.unwrap();
        let section = SectionId::new("m1-intro");

        complete_section(&module, &mut progress, &section, fixed_now()).unwrap();
        let returned = repo
            .record_section_completion(&module, &progress, &section, fixed_now())
            .await
            .unwrap();

        let stored = repo.get_module_progress(&user, &module).await.unwrap().unwrap();
        assert!(stored.is_completed());
        assert_eq!(returned, stored);
    }

    #[tokio::test]
    async fn outdated_snapshot_never_removes_completions() {
        let repo = InMemoryRepository::new();
        let module = build_sized("m3", 3);
        let user = UserId::new("u");
        let fresh = repo.start_module(&user, &module, fixed_now()).await.unwrap();

        let mut ahead = fresh.clone();
        for id in ["m3-s0", "m3-s1"] {
            let section = SectionId::new(id);
            complete_section(&module, &mut ahead, &section, fixed_now()).unwrap();
            repo.record_section_completion(&module, &ahead, &section, fixed_now())
                .await
                .unwrap();
        }

        // a writer that never saw the second completion
        let mut behind = fresh;
        let first = SectionId::new("m3-s0");
        complete_section(&module, &mut behind, &first, fixed_now()).unwrap();
        let merged = repo
            .record_section_completion(&module, &behind, &first, fixed_now())
            .await
            .unwrap();

        assert!(merged.is_section_completed(&SectionId::new("m3-s1")));
        assert_eq!(merged.current_section(), Some(&SectionId::new("m3-s2")));
        let stored = repo.get_module_progress(&user, &module).await.unwrap().unwrap();
        assert_eq!(stored.completed_sections().len(), 2);
    }

    #[tokio::test]
    async fn completion_for_missing_section_is_a_conflict() {
        let repo = InMemoryRepository::new();
        let module = build_module("m1", 1);
        let user = UserId::new("u");
        let progress = repo.start_module(&user, &module, fixed_now()).await.unwrap();
        let err = repo
            .record_section_completion(&module, &progress, &SectionId::new("m1-intro"), fixed_now())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
    }

    #[tokio::test]
    async fn records_outgrown_by_their_module_are_rebuilt() {
        let repo = InMemoryRepository::new();
        let module = build_module("m1", 1);
        let user = UserId::new("u");
        let mut progress = repo.start_module(&user, &module, fixed_now()).await.unwrap();
        let section = SectionId::new("m1-intro");
        complete_section(&module, &mut progress, &section, fixed_now()).unwrap();
        repo.record_section_completion(&module, &progress, &section, fixed_now())
            .await
            .unwrap();

        let mut grown = module.clone();
        grown.sections.push(ModuleSection {
            id: SectionId::new("m1-more"),
            number: 2,
            ..module.sections[0].clone()
        });
        repo.upsert_module(&grown).await.unwrap();
        let catalog = load_catalog(&repo).await.unwrap();

        let listed = repo.list_user_progress(&user, &catalog).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status(), ProgressStatus::InProgress);
        assert_eq!(listed[0].progress_percentage(), 50);
        assert_eq!(listed[0].current_section(), Some(&SectionId::new("m1-more")));
    }

    #[tokio::test]
    async fn ledger_filters_by_user_module_and_exercise() {
        let repo = InMemoryRepository::new();
        repo.append_submission(new_submission("u", "m1")).await.unwrap();
        repo.append_submission(new_submission("u", "m2")).await.unwrap();
        repo.append_submission(new_submission("other", "m1")).await.unwrap();
        let again = repo.append_submission(new_submission("u", "m1")).await.unwrap();
        assert_eq!(again.id, SubmissionId::new(4));

        let user = UserId::new("u");
        let all = repo.list_submissions(&user, &SubmissionQuery::all()).await.unwrap();
        assert_eq!(all.len(), 3);

        let query = SubmissionQuery::for_exercise(ModuleId::new("m1"), ExerciseId::new("m1-mood"));
        let narrowed = repo.list_submissions(&user, &query).await.unwrap();
        assert_eq!(narrowed.len(), 2);
    }

    #[tokio::test]
    async fn catalog_loads_in_number_order() {
        let repo = InMemoryRepository::new();
        repo.upsert_module(&build_module("later", 2)).await.unwrap();
        repo.upsert_module(&build_module("earlier", 1)).await.unwrap();

        let catalog = load_catalog(&repo).await.unwrap();
        assert_eq!(catalog.first().unwrap().id, ModuleId::new("earlier"));
    }
}
