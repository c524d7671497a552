use std::sync::Arc;

use chrono::{DateTime, Utc};
use storage::repository::{ModuleRepository, ProgressRepository, StorageError, load_catalog};
use wellness_core::gate::{self, ModuleOverview, SectionCompletion};
use wellness_core::model::{ModuleId, ModuleProgress, SectionId, UserId};

use super::session::{ModuleSession, PersistenceWarning, Reconciliation};
use crate::Clock;
use crate::error::ProgressServiceError;

/// A module opened for a learner.
#[derive(Debug, Clone)]
pub struct OpenedModule {
    pub session: ModuleSession,
    /// Set when the progress record could not be created in the ledger.
    pub warning: Option<PersistenceWarning>,
}

/// Result of completing a section through the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionOutcome {
    pub completion: SectionCompletion,
    /// True once this section is in the ledger.
    pub persisted: bool,
    pub warning: Option<PersistenceWarning>,
    /// The module that follows in catalog order, when this call finished the module.
    pub next_module: Option<ModuleId>,
}

/// Drives module sessions against the ledger.
///
/// Ledger writes never block the learner: a failed write leaves the local view
/// advanced and comes back as a [`PersistenceWarning`].
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    modules: Arc<dyn ModuleRepository>,
    progress: Arc<dyn ProgressRepository>,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        modules: Arc<dyn ModuleRepository>,
        progress: Arc<dyn ProgressRepository>,
    ) -> Self {
        Self {
            clock,
            modules,
            progress,
        }
    }

    /// Open a module, creating the learner's progress record on first access.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::ModuleNotFound` if the module is unknown.
    /// Returns `ProgressServiceError::Storage` if the module cannot be read.
    pub async fn open_module(
        &self,
        user_id: &UserId,
        module_id: &ModuleId,
    ) -> Result<OpenedModule, ProgressServiceError> {
        let module = self
            .modules
            .get_module(module_id)
            .await?
            .ok_or_else(|| ProgressServiceError::ModuleNotFound(module_id.clone()))?;

        let now = self.clock.now();
        match self.progress.start_module(user_id, &module, now).await {
            Ok(progress) => Ok(OpenedModule {
                session: ModuleSession::new(module, progress)?,
                warning: None,
            }),
            Err(err) => {
                tracing::warn!(
                    user = %user_id,
                    module = %module_id,
                    error = %err,
                    "progress record unavailable, starting locally"
                );
                let warning = PersistenceWarning {
                    module_id: module_id.clone(),
                    section_id: None,
                    reason: err.to_string(),
                };
                let progress = ModuleProgress::start(user_id.clone(), &module, now);
                Ok(OpenedModule {
                    session: ModuleSession::detached(module, progress)?,
                    warning: Some(warning),
                })
            }
        }
    }

    /// Complete a section: advance locally, then write to the ledger.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Gate` if the section is unknown or locked.
    /// Ledger failures are reported through `SectionOutcome::warning` instead.
    pub async fn complete_section(
        &self,
        session: &mut ModuleSession,
        section_id: &SectionId,
    ) -> Result<SectionOutcome, ProgressServiceError> {
        let now = self.clock.now();
        let completion = session.complete_locally(section_id, now)?;
        tracing::debug!(
            module = %session.module_id(),
            section = %section_id,
            percentage = completion.progress_percentage,
            "section completed locally"
        );

        let warning = self.flush(session, now).await;
        let persisted = session.is_confirmed(section_id);

        let next_module = if completion.module_completed {
            tracing::info!(
                user = %session.local().user_id(),
                module = %session.module_id(),
                "module completed"
            );
            self.next_module(session.module_id()).await
        } else {
            None
        };

        Ok(SectionOutcome {
            completion,
            persisted,
            warning,
            next_module,
        })
    }

    /// Retry writes for sections that are only complete locally.
    pub async fn sync(&self, session: &mut ModuleSession) -> Option<PersistenceWarning> {
        let now = self.clock.now();
        self.flush(session, now).await
    }

    /// Re-read the learner's record and reconcile it with the session.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if the record cannot be read;
    /// the session is left untouched in that case.
    pub async fn refresh(
        &self,
        session: &mut ModuleSession,
    ) -> Result<Reconciliation, ProgressServiceError> {
        let ticket = session.begin_refresh();
        let now = self.clock.now();
        let record = self.read_ledger(session, now).await?;

        let outcome = session.apply_refresh(ticket, record, now)?;
        if let Reconciliation::Diverged {
            unconfirmed_sections,
        } = &outcome
        {
            tracing::warn!(
                module = %session.module_id(),
                pending = unconfirmed_sections.len(),
                "ledger is behind the local view"
            );
        }
        Ok(outcome)
    }

    /// The learner's stored record for a module, if any.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::ModuleNotFound` if the module is unknown.
    /// Returns `ProgressServiceError::Storage` if repository access fails.
    pub async fn module_progress(
        &self,
        user_id: &UserId,
        module_id: &ModuleId,
    ) -> Result<Option<ModuleProgress>, ProgressServiceError> {
        let module = self
            .modules
            .get_module(module_id)
            .await?
            .ok_or_else(|| ProgressServiceError::ModuleNotFound(module_id.clone()))?;
        Ok(self.progress.get_module_progress(user_id, &module).await?)
    }

    /// Status of every catalog module for the learner.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if repository access fails.
    pub async fn overview(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<ModuleOverview>, ProgressServiceError> {
        let catalog = load_catalog(self.modules.as_ref()).await?;
        let records = self.progress.list_user_progress(user_id, &catalog).await?;
        Ok(gate::overview(&catalog, &records))
    }

    async fn read_ledger(
        &self,
        session: &ModuleSession,
        now: DateTime<Utc>,
    ) -> Result<ModuleProgress, StorageError> {
        let user_id = session.local().user_id();
        match self
            .progress
            .get_module_progress(user_id, session.module())
            .await?
        {
            Some(record) => Ok(record),
            None => {
                self.progress
                    .start_module(user_id, session.module(), now)
                    .await
            }
        }
    }

    /// Folds the ledger's record into a detached session before any write.
    async fn attach(
        &self,
        session: &mut ModuleSession,
        now: DateTime<Utc>,
    ) -> Result<(), ProgressServiceError> {
        let ticket = session.begin_refresh();
        let record = self.read_ledger(session, now).await?;
        let outcome = session.apply_refresh(ticket, record, now)?;
        tracing::debug!(module = %session.module_id(), ?outcome, "session attached to ledger");
        Ok(())
    }

    async fn flush(
        &self,
        session: &mut ModuleSession,
        now: DateTime<Utc>,
    ) -> Option<PersistenceWarning> {
        if session.is_detached() {
            if let Err(err) = self.attach(session, now).await {
                tracing::warn!(
                    module = %session.module_id(),
                    error = %err,
                    "ledger unreadable, keeping local progress"
                );
                return Some(PersistenceWarning {
                    module_id: session.module_id().clone(),
                    section_id: session.unconfirmed_sections().first().cloned(),
                    reason: err.to_string(),
                });
            }
        }

        while let Some((snapshot, section)) = session.next_write(now) {
            match self
                .progress
                .record_section_completion(session.module(), &snapshot, &section, now)
                .await
            {
                Ok(stored) => session.confirm(stored, &section, now),
                Err(err) => {
                    tracing::warn!(
                        module = %session.module_id(),
                        section = %section,
                        error = %err,
                        "section completion not saved, keeping local progress"
                    );
                    return Some(PersistenceWarning {
                        module_id: session.module_id().clone(),
                        section_id: Some(section),
                        reason: err.to_string(),
                    });
                }
            }
        }
        None
    }

    async fn next_module(&self, module_id: &ModuleId) -> Option<ModuleId> {
        match load_catalog(self.modules.as_ref()).await {
            Ok(catalog) => catalog.next_after(module_id).map(|m| m.id.clone()),
            Err(err) => {
                tracing::warn!(module = %module_id, error = %err, "could not resolve next module");
                None
            }
        }
    }
}
